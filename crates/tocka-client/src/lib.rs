pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod downloads;
pub mod error;
pub mod events;
pub mod files;
pub mod groups;
pub mod inbound;
pub mod router;
pub mod session;
pub mod view;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use controller::AddressController;
pub use error::{ClientError, Result};
pub use session::Session;
pub use view::{BufferedView, ChatView, ConsoleView};

/// Install the global tracing subscriber. Logs go to stderr so they do not
/// interleave with the conversation on stdout; `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tocka_client=debug,tocka_broker=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
