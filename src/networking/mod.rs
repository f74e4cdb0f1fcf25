#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: the authenticated datagram seam (MDP).

pub mod mdp;
