pub mod generate;
pub mod health;
pub mod setup;
pub mod stream;

pub use generate::run_generate;
pub use health::run_health;
pub use setup::{build_request, setup_from_cli, AppConfig};
pub use stream::run_stream;
