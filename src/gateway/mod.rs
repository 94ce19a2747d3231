//! Command gateway: run a command tree over HTTP.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  POST /api/fct1/sf11   ┌─────────────────────────────────────┐
//! │  Client  │ ─────────────────────> │  server.rs  (axum Router, handler)  │
//! │          │ <───────────────────── │     │                               │
//! └──────────┘   200 captured output  │     │ Translator::translate()       │
//!                                     │     v                               │
//!                                     │  translate.rs → TokenSequence       │
//!                                     │     │                               │
//!                                     │     │ InvocationRunner::call()      │
//!                                     │     v                               │
//!                                     │  runner.rs  (Session lock)          │
//!                                     │     ├─ capture.rs (redirect sink)   │
//!                                     │     └─ registry.rs (clap tree)      │
//!                                     └─────────────────────────────────────┘
//! ```
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `translate` | URL path + JSON body → `TokenSequence`                  |
//! | `registry`  | `CommandRegistry` trait, clap-backed `ClapRegistry`     |
//! | `capture`   | `CaptureBuffer`, `OutputSink` and its `Redirect` guard  |
//! | `runner`    | `InvocationRunner`: one invocation at a time            |
//! | `server`    | router, startup, `server` subcommand                    |

pub mod capture;
pub mod registry;
pub mod runner;
pub mod server;
pub mod translate;

pub use capture::{CaptureBuffer, OutputSink};
pub use registry::{ClapRegistry, CommandRegistry, NodeInfo};
pub use runner::InvocationRunner;
pub use server::{build_router, serve, start_server, with_server_command};
pub use translate::{TokenSequence, Translator, translate};
