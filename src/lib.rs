//! Development-time SMTP sink.
//!
//! Accepts mail from arbitrary clients over SMTP (plain TCP or whole-socket
//! TLS), parses MIME content into a [`model::MailItem`], and fans each
//! assembled message out to registered [`receiver::MailReceiver`]s —
//! persistence, logging, webhooks, or anything an embedder plugs in.

pub mod mime;
pub mod model;
pub mod protocol;
pub mod receiver;
pub mod runtime;
pub mod sanitize;
pub mod utils;
