pub mod body;
pub mod decoders;
pub mod imap_client;
pub mod message;
pub mod transport;
