/// Application name
pub const APP_NAME: &str = "Tocka";

/// Suffix appended to a user queue or group exchange name to get its
/// file-transfer counterpart.
pub const FILES_SUFFIX: &str = "_files";

/// Prefix of broker-owned exchanges (`amq.direct`, `amq.fanout`, ...)
pub const BROKER_INTERNAL_PREFIX: &str = "amq.";

/// Display format of payload dates: `dd/MM/yyyy 'at' HH:mm`
pub const DATE_FORMAT: &str = "%d/%m/%Y at %H:%M";

/// `content.type` of a text message
pub const CONTENT_TYPE_TEXT: &str = "text";

/// `content.type` of a file transfer
pub const CONTENT_TYPE_FILE: &str = "file";

/// MIME type of text message bodies
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// MIME type used when probing a file yields nothing
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// `content.name` of text messages, which carry no file name
pub const TEXT_CONTENT_NAME: &str = "";

/// Upper bound accepted when decoding a payload (128 MiB, the broker's
/// default maximum message size). Guards against corrupt length prefixes.
pub const MAX_PAYLOAD_SIZE: u64 = 128 * 1024 * 1024;

/// Default AMQP port
pub const DEFAULT_AMQP_PORT: u16 = 5672;

/// Default management (HTTP control-plane) port
pub const DEFAULT_MANAGEMENT_PORT: u16 = 15672;

/// Initial replica count of quorum queues
pub const DEFAULT_QUORUM_GROUP_SIZE: u32 = 3;
