// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Media download pipeline: content-addressed storage, dedup, validation.

pub mod paths;
pub mod validate;
pub mod phash;
pub mod pipeline;
pub mod retry_service;

pub use pipeline::{MediaJob, MediaPipeline};
