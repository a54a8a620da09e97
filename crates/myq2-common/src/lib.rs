// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later

#![allow(clippy::needless_range_loop, clippy::manual_range_contains, clippy::float_cmp)]

pub mod q_shared;
pub mod qfiles;
pub mod cvar;
pub mod common;
