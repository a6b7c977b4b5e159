//! Media driver runtime: shared-memory log buffers, the Data/NAK/Setup/
//! Status-Message term protocol, and the conductor/sender/receiver agents
//! that drive publications and subscriptions over UDP.
//!
//! A client process never talks to the network directly. It opens the
//! driver directory (`cnc.dat`), enqueues commands on the to-driver ring,
//! and listens on the to-clients broadcast buffer for the conductor's
//! responses and stream availability events. Everything between a
//! client's `add_publication` call and bytes landing on the wire happens
//! inside this crate, across the three agents in [`Driver`].

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod Concurrent;

#[allow(non_snake_case)]
pub mod LogBuffer;

#[allow(non_snake_case)]
pub mod FlowControl;

#[allow(non_snake_case)]
pub mod CongestionControl;

#[allow(non_snake_case)]
pub mod LossDetection;

#[allow(non_snake_case)]
pub mod Transport;

pub mod Registry;

#[allow(non_snake_case)]
pub mod Driver;

pub mod config;
pub mod error;
