//! AI-assisted study aids for biology notes: quizzes, mind maps, diagrams
//! and explanations generated by a remote model.

pub mod backoff;
pub mod config;
pub mod credentials;
pub mod error;
pub mod generator;
pub mod mindmap;
pub mod quiz;
pub mod remote;

pub use backoff::RetryPolicy;
pub use config::{Backend, Config, ConfigError, GeneratorConfig};
pub use credentials::{CredentialStorage, CredentialStore, FileCredentialStorage, MemoryCredentialStorage};
pub use error::{classify, Result, StudyError};
pub use generator::StudyGenerator;
pub use mindmap::MindMapNode;
pub use quiz::{Difficulty, Question, Quiz};
pub use remote::{GenerationRequest, GenerationResponse, GenerativeModel, RemoteFailure};
