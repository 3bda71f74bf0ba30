//! # wallfit
//!
//! Turns a small set of bucket-sized base images into exact-size wallpapers
//! for an arbitrary table of devices, enlarging each base at most once per
//! method and resuming cleanly after interruption.
//!
//! # Architecture: Resume-Aware Pipeline
//!
//! ```text
//! 1. Generate   prompts      →  NNN_BB_base_WxH.png              (optional, library only)
//! 2. Plan       device table →  tasks + final jobs               (no image work)
//! 3. Dispatch   tasks        →  NNN_BB_upscaled_<method>_WxH.png (one group per method)
//! 4. Finalize   final jobs   →  NNN_BB_<device>.jpg              (cover-fit + JPEG)
//! ```
//!
//! The output directory is the only state. Every artifact name encodes what
//! it is, so "already done" is a file-existence check and a rerun after a
//! crash picks up exactly where the last one stopped. All writes go through a
//! temporary file plus rename, so a partial file never carries a final name.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`bucket`] | The four fixed aspect-ratio buckets and aspect classification |
//! | [`method`] | Enlargement methods and their strategy table (scale, trust limit, cost) |
//! | [`device`] | Device table entries and their resolution to bucket + factor |
//! | [`types`] | Content ids and artifact keys |
//! | [`naming`] | Artifact key ⇄ filename convention |
//! | [`cache`] | Output-directory scanning and atomic writes |
//! | [`plan`] | Method selection and deduplicated task planning |
//! | [`dispatch`] | Method-grouped, bounded-concurrency enlargement with retries |
//! | [`finalize`] | Cover-fit crop and JPEG encoding of every final |
//! | [`generate`] | Seeded base-image generation through a [`imaging::BaseGenerator`] |
//! | [`process`] | Run driver: plan → dispatch → finalize → sweep, plus status |
//! | [`config`] | `wallfit.toml` loading, merging over stock defaults, validation |
//! | [`imaging`] | Backend traits, cover-fit math and pure-Rust image operations |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Enlarge Per Bucket, Not Per Device
//!
//! Devices that share a bucket and a method share one enlargement; the
//! cover-fit step absorbs the remaining size difference. Expensive model
//! calls scale with the number of buckets, not the number of devices.
//!
//! ## Backends Behind Traits
//!
//! Enlargement and generation go through [`imaging::Enlarger`] and
//! [`imaging::BaseGenerator`]. The CLI ships [`imaging::ResampleEnlarger`]
//! (Lanczos3); model-backed enlargers plug in without touching the pipeline,
//! and tests use recording mocks.

pub mod bucket;
pub mod cache;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod finalize;
pub mod generate;
pub mod imaging;
pub mod method;
pub mod naming;
pub mod output;
pub mod plan;
pub mod process;
pub mod types;
