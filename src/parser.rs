use crate::models::InstallRecord;

/// Fixed positions of the fields read from every data row. Only the
/// application id column is located through the header.
pub const COMPUTER_ID_COLUMN: usize = 0;
pub const USER_ID_COLUMN: usize = 1;
pub const COMPUTER_TYPE_COLUMN: usize = 3;

/// What became of a single data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Install(InstallRecord),
    /// Application id missing, unparseable, or for another application.
    NotTarget,
    /// A target row whose own fields could not be parsed.
    Malformed,
}

/// Turns raw inventory lines into install records for one application.
#[derive(Debug, Clone)]
pub struct RowParser {
    app_id_index: usize,
    target_app_id: i64,
    delimiter: char,
}

impl RowParser {
    pub fn new(app_id_index: usize, target_app_id: i64, delimiter: char) -> Self {
        Self {
            app_id_index,
            target_app_id,
            delimiter,
        }
    }

    pub fn app_id_index(&self) -> usize {
        self.app_id_index
    }

    pub fn target_app_id(&self) -> i64 {
        self.target_app_id
    }

    pub fn parse_line(&self, line: &str) -> Option<InstallRecord> {
        match self.classify_line(line) {
            RowOutcome::Install(record) => Some(record),
            RowOutcome::NotTarget | RowOutcome::Malformed => None,
        }
    }

    pub fn classify_line(&self, line: &str) -> RowOutcome {
        let fields: Vec<&str> = line.split(self.delimiter).collect();

        let app_id = fields
            .get(self.app_id_index)
            .and_then(|field| parse_int(field));
        if app_id != Some(self.target_app_id) {
            return RowOutcome::NotTarget;
        }

        let computer_id = fields.get(COMPUTER_ID_COLUMN).and_then(|f| parse_int(f));
        let user_id = fields.get(USER_ID_COLUMN).and_then(|f| parse_int(f));
        let computer_type = fields.get(COMPUTER_TYPE_COLUMN);

        match (computer_id, user_id, computer_type) {
            (Some(computer_id), Some(user_id), Some(computer_type)) => {
                RowOutcome::Install(InstallRecord::new(computer_id, user_id, computer_type))
            }
            _ => RowOutcome::Malformed,
        }
    }
}

fn parse_int(field: &str) -> Option<i64> {
    field.trim().parse().ok()
}
