//! A1-notation helpers: column letters, widths and row ranges.

/// Zero-based index of a column letter (`A` → 0, `AK` → 36).
pub fn column_index(column: &str) -> Result<usize, String> {
    let column = column.trim();
    if column.is_empty() {
        return Err("empty column".to_string());
    }
    let mut index = 0usize;
    for ch in column.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(format!("'{}' is not a column letter", ch));
        }
        let value = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(value))
            .ok_or_else(|| "column out of range".to_string())?;
    }
    Ok(index - 1)
}

/// Column letters for a zero-based index.
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Number of columns from `start` to `end`, inclusive.
pub fn range_width(start: &str, end: &str) -> Result<usize, String> {
    let start = column_index(start)?;
    let end = column_index(end)?;
    if end < start {
        return Err("end column precedes start column".to_string());
    }
    Ok(end - start + 1)
}

/// `Tab!B4:AK4`, quoting the tab name.
pub fn row_range(tab: &str, start: &str, end: &str, row: i64) -> String {
    format!(
        "'{}'!{}{}:{}{}",
        tab.replace('\'', "''"),
        start,
        row,
        end,
        row
    )
}
