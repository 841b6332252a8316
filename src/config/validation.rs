//! Configuration validation.
//!
//! Everything is checked up front so a bad file is rejected as a whole, with
//! the offending field named in the error.

use anyhow::{Context, Result};

use super::Config;
use crate::time::LocalTime;

pub fn validate_config(config: &Config) -> Result<()> {
    let (start, end) = config
        .fixed_window()
        .context("custom_start and custom_end must be times in HH:MM format")?;
    validate_window(start, end)?;

    config
        .timezone()
        .context("timezone must be an IANA timezone name such as \"Europe/Berlin\"")?;

    let (sunset, sunrise) = config
        .twilight_boundaries()
        .context("sunset and sunrise must be times in HH:MM format")?;
    if sunset == sunrise {
        anyhow::bail!("sunset and sunrise cannot be the same time ({sunset})");
    }

    Ok(())
}

/// A fixed window needs two different boundaries; `start == end` would never
/// be active.
pub fn validate_window(start: LocalTime, end: LocalTime) -> Result<()> {
    if start == end {
        anyhow::bail!(
            "custom_start and custom_end cannot be the same time ({start}); the window would be empty"
        );
    }
    Ok(())
}
