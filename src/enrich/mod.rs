// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Periodic enrichment scans: members, profile photos, stories.

pub mod scheduler;
pub mod members;
pub mod photos;
pub mod stories;
