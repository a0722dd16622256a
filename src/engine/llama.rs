//! llama.cpp backend
//!
//! Native engine over GGUF weights, compiled only with the `llama` feature
//! (`cuda`, `vulkan` and `metal` pass straight through to llama-cpp-2).
//! Generation runs inside `block_in_place`, so the binary needs the
//! multi-thread runtime.

use std::num::NonZeroU32;
use std::path::Path;

use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use once_cell::sync::OnceCell;

use crate::engine::backend::{EngineBackend, EngineError, StreamToken, TextEngine, TokenSender};
use crate::types::config::EngineConfig;

// llama.cpp allows exactly one backend per process
static BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

fn shared_backend() -> Result<&'static LlamaBackend, EngineError> {
    BACKEND.get_or_try_init(|| {
        LlamaBackend::init().map_err(|e| EngineError::Initialization(e.to_string()))
    })
}

fn require_asset(path: &Path, what: &str) -> Result<(), EngineError> {
    if !path.exists() {
        return Err(EngineError::Initialization(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

/// Backend constructing llama.cpp engines
#[derive(Default)]
pub struct LlamaCppBackend;

impl LlamaCppBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineBackend for LlamaCppBackend {
    async fn construct(&self, config: &EngineConfig) -> Result<Box<dyn TextEngine>, EngineError> {
        require_asset(&config.base_path, "base model")?;
        if let Some(adapter) = &config.adapter_path {
            require_asset(adapter, "adapter")?;
        }

        let backend = shared_backend()?;
        let params = LlamaModelParams::default();
        let model = tokio::task::block_in_place(|| {
            LlamaModel::load_from_file(backend, &config.base_path, &params)
                .map_err(|e| EngineError::Initialization(e.to_string()))
        })?;
        tracing::info!(model = %config.base_path.display(), "gguf model loaded");

        Ok(Box::new(LlamaEngine {
            model,
            config: config.clone(),
            closed: false,
        }))
    }
}

/// One live llama.cpp engine: loaded weights plus generation parameters
pub struct LlamaEngine {
    model: LlamaModel,
    config: EngineConfig,
    closed: bool,
}

#[async_trait]
impl TextEngine for LlamaEngine {
    async fn generate(&mut self, prompt: &str, tokens: TokenSender) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::NotReady);
        }
        let backend = shared_backend()?;

        // fresh context per generation; room for the prompt and the reply
        let n_ctx = self.config.max_tokens.saturating_mul(2).max(2048);
        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(n_ctx));

        tokio::task::block_in_place(|| {
            let mut ctx = self
                .model
                .new_context(backend, ctx_params)
                .map_err(|e| EngineError::Inference(e.to_string()))?;

            if let Some(adapter_path) = &self.config.adapter_path {
                let mut adapter = self
                    .model
                    .lora_adapter_init(adapter_path)
                    .map_err(|e| EngineError::Initialization(e.to_string()))?;
                ctx.lora_adapter_set(&mut adapter, 1.0)
                    .map_err(|e| EngineError::Initialization(e.to_string()))?;
            }

            let prompt_tokens = self
                .model
                .str_to_token(prompt, AddBos::Always)
                .map_err(|e| EngineError::Inference(e.to_string()))?;
            let last_index = prompt_tokens.len() as i32 - 1;

            let mut batch = LlamaBatch::new(n_ctx as usize, 1);
            for (i, token) in (0_i32..).zip(prompt_tokens.into_iter()) {
                batch
                    .add(token, i, &[0], i == last_index)
                    .map_err(|e| EngineError::Inference(e.to_string()))?;
            }
            ctx.decode(&mut batch)
                .map_err(|e| EngineError::Inference(e.to_string()))?;

            let mut sampler = LlamaSampler::chain_simple([
                LlamaSampler::top_k(self.config.top_k as i32),
                LlamaSampler::temp(self.config.temperature),
                LlamaSampler::dist(u32::MAX),
            ]);

            let mut n_cur = batch.n_tokens();
            let mut produced = 0u32;
            while produced < self.config.max_tokens {
                let token = sampler.sample(&ctx, batch.n_tokens() - 1);
                sampler.accept(token);
                if self.model.is_eog_token(token) {
                    break;
                }

                let piece = self
                    .model
                    .token_to_str(token, Special::Tokenize)
                    .map_err(|e| EngineError::Inference(e.to_string()))?;
                let _ = tokens.send(StreamToken::Delta(piece));

                batch.clear();
                batch
                    .add(token, n_cur, &[0], true)
                    .map_err(|e| EngineError::Inference(e.to_string()))?;
                n_cur += 1;
                ctx.decode(&mut batch)
                    .map_err(|e| EngineError::Inference(e.to_string()))?;
                produced += 1;
            }

            tracing::debug!(tokens = produced, "llama generation finished");
            let _ = tokens.send(StreamToken::Final(String::new()));
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        // weights and contexts free when the engine value drops
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_weights_fail_construction() {
        let backend = LlamaCppBackend::new();
        let config = EngineConfig {
            base_path: PathBuf::from("./does-not-exist.gguf"),
            max_tokens: 16,
            temperature: 0.7,
            top_k: 40,
            adapter_path: None,
        };
        let err = backend
            .construct(&config)
            .await
            .err()
            .expect("construction must fail");
        assert!(matches!(err, EngineError::Initialization(_)));
        assert!(err.to_string().contains("base model not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_adapter_fails_construction() {
        let backend = LlamaCppBackend::new();
        let config = EngineConfig {
            base_path: PathBuf::from("./does-not-exist.gguf"),
            max_tokens: 16,
            temperature: 0.7,
            top_k: 40,
            adapter_path: Some(PathBuf::from("./missing-adapter.bin")),
        };
        // base model check runs first
        let err = backend
            .construct(&config)
            .await
            .err()
            .expect("construction must fail");
        assert!(err.to_string().contains("not found"));
    }
}
