//! Integration tests for Cinerelay
//!
//! Every test runs the real router on an ephemeral port in front of an
//! in-process fake upstream, and talks to it over TCP with `reqwest`.

#[path = "integration/fake_upstream.rs"]
mod fake_upstream;
#[path = "integration/harness.rs"]
mod harness;

#[path = "integration/disconnect.rs"]
mod disconnect;
#[path = "integration/full_relay.rs"]
mod full_relay;
#[path = "integration/metadata_passthrough.rs"]
mod metadata_passthrough;
#[path = "integration/range_streaming.rs"]
mod range_streaming;
#[path = "integration/source_resolution.rs"]
mod source_resolution;
