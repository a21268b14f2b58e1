//! Page bridge.
//!
//! Connects a live page to the Rust side over a local WebSocket.
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Rust           │                              │  Host page      │
//! │                 │         WebSocket            │                 │
//! │  BridgeServer   │◄────────────────────────────►│  bridge script  │
//! │  → BridgePage   │      127.0.0.1:PORT          │  (fetch hook)   │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `assets` | In-page bridge script |
//! | `connection` | WebSocket connection and event loop |
//! | `page` | [`BridgePage`]: advancement and event routing |
//! | `protocol` | Request, Response and Event messages |
//! | `server` | WebSocket server binding and acceptance |

// ============================================================================
// Submodules
// ============================================================================

/// In-page bridge script.
pub mod assets;

/// WebSocket connection and event loop.
pub mod connection;

/// Page handle backed by a bridge connection.
pub mod page;

/// Bridge message types.
pub mod protocol;

/// WebSocket server the page connects to.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use assets::{bridge_bookmarklet, bridge_script};
pub use connection::{Connection, EventHandler, ReadyData};
pub use page::BridgePage;
pub use protocol::{
    AdvanceResult, BodyEncoding, Command, Event, PageInfo, ParsedEvent, Request, Response,
    ResponseCompleted, ResponseType,
};
pub use server::BridgeServer;
