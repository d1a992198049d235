//! Locates the application id column in the header line.

/// Where the application id lives, and whether the header actually said so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnResolution {
    pub index: usize,
    /// True when no header field matched and `index` is the fallback column.
    pub fallback: bool,
}

/// Byte order mark some spreadsheet exports put in front of the first field.
const BOM: char = '\u{feff}';

/// Find the zero-based index of the field equal to `column_name`, ignoring
/// case and surrounding whitespace. Returns `fallback_index` flagged as a
/// fallback when the header has no such field.
pub fn resolve_app_id_column(
    header: &str,
    delimiter: char,
    column_name: &str,
    fallback_index: usize,
) -> ColumnResolution {
    let wanted = column_name.trim();

    let found = header
        .trim_start_matches(BOM)
        .split(delimiter)
        .position(|field| field.trim().eq_ignore_ascii_case(wanted));

    match found {
        Some(index) => ColumnResolution {
            index,
            fallback: false,
        },
        None => ColumnResolution {
            index: fallback_index,
            fallback: true,
        },
    }
}
