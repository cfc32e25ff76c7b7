pub mod core;
pub mod history;
pub mod ingest;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
