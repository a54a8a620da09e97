// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// common.rs — console print entry points
//
// Output goes through the `log` facade; the application installs the
// logger and decides where the lines end up.

/// General-purpose print.
pub fn com_printf(msg: &str) {
    let msg = msg.trim_end_matches('\n');
    if !msg.is_empty() {
        log::info!("{}", msg);
    }
}

/// Developer-only print. Shows up when the logger enables debug output.
pub fn com_dprintf(msg: &str) {
    let msg = msg.trim_end_matches('\n');
    if !msg.is_empty() {
        log::debug!("{}", msg);
    }
}
