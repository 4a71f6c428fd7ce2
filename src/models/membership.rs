// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use crate::schema::memberships;

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = memberships)]
pub struct Membership {
    pub id: i32,
    pub user_id: i32,
    pub dialog_id: i32,
    pub joined_at: Option<NaiveDateTime>,
    pub is_admin: bool,
    pub admin_title: Option<String>,
    pub is_active: bool,
    pub leave_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = memberships)]
pub struct NewMembership {
    pub user_id: i32,
    pub dialog_id: i32,
    pub joined_at: Option<NaiveDateTime>,
    pub is_admin: bool,
    pub admin_title: Option<String>,
    pub is_active: bool,
}
