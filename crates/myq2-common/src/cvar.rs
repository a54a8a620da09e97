// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// cvar.rs — console variables used to configure the refresh

use crate::common::com_printf;

use std::collections::HashMap;

pub const CVAR_ARCHIVE: i32 = 1; // set to cause it to be saved to config
pub const CVAR_LATCH: i32 = 16; // applied at the next level load

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: i32,
    pub value: f32,
}

/// All registered console variables.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Get or create a cvar. An existing cvar keeps its value; the flags
    /// are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    /// Set a cvar value. A latched cvar keeps its value until
    /// `get_latched_vars`.
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        let idx = match self.cvar_index.get(name) {
            Some(&idx) => idx,
            None => return self.get(name, value, 0),
        };
        let var = &mut self.cvar_vars[idx];

        if var.flags & CVAR_LATCH != 0 {
            if var.latched_string.as_deref() == Some(value)
                || (var.latched_string.is_none() && value == var.string)
            {
                return idx;
            }
            com_printf(&format!("{} will be changed for the next map.\n", name));
            var.latched_string = Some(value.to_string());
            return idx;
        }

        if value == var.string {
            return idx; // not changed
        }

        var.string = value.to_string();
        var.value = parse_value(value);
        idx
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) -> usize {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str)
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                    }
        }
    }
}

// =============================================================
//  Tests
// =============================================================
