use std::path::PathBuf;

use clap::Parser;

use crate::engine::ChatFormat;

#[derive(Parser, Debug, Clone)]
#[command(name = "llm-gateway", about = "Model-serving HTTP gateway")]
pub struct Settings {
    /// Remote URI the model artifact is fetched from.
    #[arg(
        long,
        env = "MODEL_URI",
        default_value = "https://huggingface.co/second-state/Llava-v1.5-7B-GGUF/resolve/main/llava-v1.5-7b-Q4_K_M.gguf"
    )]
    pub model_uri: String,

    /// Local folder the artifact is stored under.
    #[arg(long, env = "MODEL_FOLDER", default_value = "models")]
    pub model_folder: PathBuf,

    /// Prompt template applied to the conversation history.
    #[arg(long, env = "CHAT_FORMAT", value_enum, default_value = "vicuna")]
    pub chat_format: ChatFormat,

    /// Base URL of the llama.cpp-compatible completion server.
    #[arg(long, env = "ENGINE_URL", default_value = "http://localhost:8080")]
    pub engine_url: String,

    /// Address the gateway listens on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: String,

    /// Accept invalid TLS certificates on the download path. Defaults to
    /// true to tolerate mirror hosts with broken certificate chains.
    #[arg(
        long,
        env = "INSECURE_TLS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub insecure_tls: bool,
}

impl Settings {
    fn filename(&self) -> &str {
        self.model_uri
            .rsplit('/')
            .next()
            .unwrap_or(&self.model_uri)
    }

    /// Destination path of the artifact: the configured folder plus the
    /// URI's final path segment.
    pub fn model_path(&self) -> PathBuf {
        self.model_folder.join(self.filename())
    }

    /// Model name reported to clients: the filename with its extension
    /// removed.
    pub fn model_name(&self) -> String {
        let filename = self.filename();
        match filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => filename.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(uri: &str) -> Settings {
        Settings {
            model_uri: uri.to_string(),
            model_folder: PathBuf::from("models"),
            chat_format: ChatFormat::Vicuna,
            engine_url: "http://localhost:8080".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            insecure_tls: true,
        }
    }

    #[test]
    fn model_path_uses_last_uri_segment() {
        let s = settings("https://example.com/repo/resolve/main/llava-v1.5-7b-Q4_K_M.gguf");
        assert_eq!(
            s.model_path(),
            PathBuf::from("models/llava-v1.5-7b-Q4_K_M.gguf")
        );
    }

    #[test]
    fn model_name_strips_extension() {
        let s = settings("https://example.com/llava-v1.5-7b-Q4_K_M.gguf");
        assert_eq!(s.model_name(), "llava-v1.5-7b-Q4_K_M");
    }

    #[test]
    fn model_name_without_extension_is_unchanged() {
        let s = settings("https://example.com/some-model");
        assert_eq!(s.model_name(), "some-model");
    }
}
