pub mod config;
pub mod error;

pub use config::{load_dotenv, AthenaConfig, AwsConfig, Config};
pub use error::{ErrorKind, RemoteError};
