//! # Peer Replication Library
//!
//! This library implements the peer side of a sailing game's state
//! synchronization. Every participant owns exactly one boat, simulates it
//! locally, and streams its state to every other participant over an
//! unreliable peer-to-peer transport. There is no server and no authority:
//! each peer is the sole author of its own boat and a passive mirror of
//! everyone else's.
//!
//! ## Replication Model
//!
//! ### Snapshots
//! A boat's replicated state travels as two independent snapshot streams:
//! the world transform, and the animation blend factors (flag rotation, sail
//! fold, wind). Each snapshot carries the sender's timestamp from the moment
//! it was captured.
//!
//! ### Rate Adaptation
//! The send scheduler spends bandwidth where it is visible. Nearby peers get
//! updates up to 25 times a second, distant peers down to 5, and any peer
//! reached through a relay server once a second regardless of distance.
//!
//! ### Staleness Rejection
//! The transport guarantees neither order nor uniqueness. A remote boat
//! applies a snapshot only if its timestamp is strictly newer than the last
//! applied one of the same kind, so late or duplicated packets are dropped
//! and a lost packet is simply superseded by the next one.
//!
//! ## Module Organization
//!
//! ### Entity Module (`entity`)
//! Boats, their parent-relative placement and animation blend state.
//!
//! ### Staleness Module (`staleness`)
//! Per-stream high-water marks for inbound snapshots.
//!
//! ### Applier Module (`applier`)
//! Filters and applies inbound snapshots to remote boats.
//!
//! ### Scheduler Module (`scheduler`)
//! Per-peer, distance-adaptive send decisions and the data-flow hook.
//!
//! ### Physics Module (`physics`)
//! Control flags, sail thrust and steering, and a minimal hull integrator.
//!
//! ### Session Module (`session`)
//! Owns the local boat and the peer→boat map; the simulation-thread entry
//! point for transport events, physics steps and sends.
//!
//! ### Transport, Directory and Network Modules
//! The transport seam, the UDP address book, and the UDP peer node.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use peer::physics::{BoatTuning, KinematicHull};
//! use peer::scheduler::SyncConfig;
//! use peer::session::Session;
//! use peer::transport::{PeerId, Transport, TransportEvent};
//! use peer::error::TransportError;
//! use shared::{current_timestamp, Packet, Transform};
//! use glam::Vec3;
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     fn send(&mut self, _peer: PeerId, _packet: &Packet) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut session = Session::new(SyncConfig::default(), BoatTuning::default(), Transform::IDENTITY);
//! let mut hull = KinematicHull::new(100.0, Transform::IDENTITY);
//! let (_events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<TransportEvent>();
//!
//! loop {
//!     let dt = 1.0 / 60.0;
//!     session.drain_events(&mut events_rx);
//!     session.steer_local(dt, Vec3::Z, &mut hull);
//!     hull.integrate(dt);
//!     session.sync_local(&hull);
//!     session.send_updates(current_timestamp(), &mut Loopback);
//! #   break;
//! }
//! ```

pub mod applier;
pub mod directory;
pub mod entity;
pub mod error;
pub mod network;
pub mod physics;
pub mod scheduler;
pub mod session;
pub mod staleness;
pub mod transport;
