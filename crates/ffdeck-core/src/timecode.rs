/// Parse `HH:MM:SS[.fff]`, `MM:SS[.fff]` or plain seconds into seconds.
///
/// Returns `None` for empty, negative or malformed input. Minutes and seconds
/// fields are not range-checked beyond being non-negative, matching what
/// ffmpeg itself accepts for `-ss`/`-to`/`-t`.
pub fn parse_timecode(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let (whole, seconds_part) = parts.split_at(parts.len() - 1);
    let seconds = parse_component(seconds_part[0])?;
    let mut total = seconds;
    let mut scale = 60.0;
    for part in whole.iter().rev() {
        if part.contains('.') {
            return None;
        }
        total += parse_component(part)? * scale;
        scale *= 60.0;
    }

    Some(total)
}

fn parse_component(part: &str) -> Option<f64> {
    let part = part.trim();
    if part.is_empty() || part.starts_with('-') || part.starts_with('+') {
        return None;
    }
    let value = part.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Render whole seconds as `HH:MM:SS`. Fractions are truncated.
pub fn format_timecode(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
