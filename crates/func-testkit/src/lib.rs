//! func-testkit - Integration-test harness for Azure Functions projects.
//!
//! Starts a local Functions host (`func start`) for a test suite, waits until
//! it is ready, hands out HTTP clients bound to it and tears the whole process
//! tree down afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use func_testkit::{FactorySettings, FunctionApplicationFactory, ProjectLocator};
//!
//! #[tokio::main]
//! async fn main() -> func_testkit::Result<()> {
//!     let locator = ProjectLocator::new("Function.Demo")?;
//!     let settings = FactorySettings::new().with_health_check_endpoint("/api/health");
//!     let mut factory = FunctionApplicationFactory::new(&locator, ["--port", "7072"], settings)?;
//!
//!     let client = factory.create_client().await?;
//!     let response = client.get("/api/hello?name=test")?.send().await?;
//!     println!("{}", response.status());
//!
//!     factory.stop().await
//! }
//! ```

pub mod cancel;
pub mod cmdline;
pub mod config;
pub mod error;
pub mod factory;
pub mod locator;
pub mod network;
pub mod platform;
pub mod process;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use cmdline::CommandOption;
pub use config::{FactorySettings, HostConfig, NetworkConfig};
pub use error::{FuncTestError, Result};
pub use factory::{FunctionApplicationFactory, HostState, PortSubstitution};
pub use locator::{FunctionLocator, PathLocator, ProjectLocator};
pub use network::{HealthProbe, HostClient, ReqwestProbe};
pub use process::{Executable, ExecutableOptions, ExitProbe, LineCallback, ProcessExit};
