pub mod config;
pub mod logging;

pub mod capture;
pub mod chunk;
pub mod fetch;
pub mod lifecycle;
pub mod mux;
pub mod naming;
pub mod reassembly;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod workdir;
