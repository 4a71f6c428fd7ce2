// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::{detections, detectors};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = detectors)]
pub struct Detector {
    pub id: i32,
    pub name: String,
    pub pattern: String,
    pub category: String,
    pub description: Option<String>,
    pub priority: i32,
    pub is_builtin: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = detectors)]
pub struct NewDetector {
    pub name: String,
    pub pattern: String,
    pub category: String,
    pub description: Option<String>,
    pub priority: i32,
    pub is_builtin: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = detections)]
pub struct Detection {
    pub id: i64,
    pub message_id: i64,
    pub detector_id: i32,
    pub detection_type: String,
    pub matched_text: String,
    pub normalized_value: String,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = detections)]
pub struct NewDetection {
    pub message_id: i64,
    pub detector_id: i32,
    pub detection_type: String,
    pub matched_text: String,
    pub normalized_value: String,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
}
