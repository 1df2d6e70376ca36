//! qshot: compile QIR, then simulate it shot by shot
//!
//! This crate ties the qshot stages into one [`Pipeline`]:
//!
//! ```text
//! QIR text ──load──▶ Module ──validate──▶ ──extract──▶ EntryPointAttributes
//!                                  │                          │
//!                                  └──compile(target, level)──┼──▶ QIS Module
//!                                                             │        │
//!                                                   execute(ShotSpec) ◀┘
//!                                                             │
//!                                    aggregate ──▶ ResultSet ──▶ format ──▶ labeled shots
//! ```
//!
//! The stages themselves live in their own crates and can be used directly:
//! [`qshot_ir`], [`qshot_profile`], [`qshot_compile`], [`qshot_exec`] and
//! [`qshot_adapter_sim`].
//!
//! # Example
//!
//! ```rust,no_run
//! use qshot::{Pipeline, PipelineConfig};
//!
//! # async fn demo(source: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load(None)?;
//! qshot::init_tracing(&config.logging).ok();
//!
//! let pipeline = Pipeline::new(config);
//! let prepared = pipeline.prepare(source)?;
//! let report = pipeline.run(prepared).await?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;

pub use config::{
    AggregationConfig, AttributesConfig, CompileConfig, ConfigError, ExecutionConfig,
    LoggingConfig, OutputConfig, PipelineConfig,
};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, PipelineReport, Prepared};
pub use telemetry::{LogFormat, init_tracing};

pub use qshot_adapter_sim;
pub use qshot_compile;
pub use qshot_exec;
pub use qshot_ir;
pub use qshot_profile;
