use std::collections::BTreeMap;

use crate::error::EtlError;
use crate::schema::SheetRole;

/// Pick one sheet per role: the first name containing the role keyword,
/// case-insensitively. Any unmatched role rejects the whole workbook.
pub fn classify_sheets<S: AsRef<str>>(
    sheet_names: &[S],
) -> Result<BTreeMap<SheetRole, String>, EtlError> {
    let mut found = BTreeMap::new();
    let mut missing = Vec::new();

    for role in SheetRole::ALL {
        let hit = sheet_names
            .iter()
            .map(AsRef::as_ref)
            .find(|name| name.to_lowercase().contains(role.keyword()));
        match hit {
            Some(name) => {
                found.insert(role, name.to_string());
            }
            None => missing.push(role),
        }
    }

    if missing.is_empty() {
        Ok(found)
    } else {
        Err(EtlError::MissingSheets(missing))
    }
}
