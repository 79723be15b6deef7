use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    #[error("start marker {0:?} not found")]
    StartMissing(String),

    #[error("end marker {0:?} not found")]
    EndMissing(String),

    #[error("marker {marker:?} appears {count} times")]
    Duplicated { marker: String, count: usize },

    #[error("end marker {end:?} precedes start marker {start:?}")]
    OutOfOrder { start: String, end: String },
}

fn positions(lines: &[&str], marker: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim() == marker)
        .map(|(i, _)| i)
        .collect()
}

fn single(lines: &[&str], marker: &str, missing: MarkerError) -> Result<usize, MarkerError> {
    match positions(lines, marker).as_slice() {
        [] => Err(missing),
        [pos] => Ok(*pos),
        many => Err(MarkerError::Duplicated {
            marker: marker.to_string(),
            count: many.len(),
        }),
    }
}

/// Replace everything strictly between the `start` and `end` marker lines with
/// `replacement`. Marker lines and everything outside them are kept
/// byte-for-byte. Each marker must appear exactly once, start before end.
pub fn replace_between_markers(
    text: &str,
    start: &str,
    end: &str,
    replacement: &[String],
) -> Result<String, MarkerError> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let start_at = single(&lines, start, MarkerError::StartMissing(start.to_string()))?;
    let end_at = single(&lines, end, MarkerError::EndMissing(end.to_string()))?;
    if end_at < start_at {
        return Err(MarkerError::OutOfOrder {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut out = String::with_capacity(text.len());
    for line in &lines[..=start_at] {
        out.push_str(line);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    for line in replacement {
        out.push_str(line);
        if !line.ends_with('\n') {
            out.push('\n');
        }
    }
    for line in &lines[end_at..] {
        out.push_str(line);
    }
    Ok(out)
}
