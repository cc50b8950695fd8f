use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::Drug;

fn drug_from_row(row: &Row) -> rusqlite::Result<Drug> {
    Ok(Drug {
        id: row.get(0)?,
        item_name: row.get(1)?,
        entp_name: row.get(2)?,
        efficacy: row.get(3)?,
        use_method: row.get(4)?,
        warning_info: row.get(5)?,
        caution_info: row.get(6)?,
        interaction: row.get(7)?,
        side_effects: row.get(8)?,
        storage_method: row.get(9)?,
        data_source: row.get(10)?,
    })
}

const DRUG_COLUMNS: &str = "id, item_name, entp_name, efficacy, use_method, warning_info,
     caution_info, interaction, side_effects, storage_method, data_source";

/// Insert or fully overwrite a drug row by id (catalog resync semantics).
pub fn upsert_drug(conn: &Connection, drug: &Drug) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO drugs (id, item_name, entp_name, efficacy, use_method, warning_info,
         caution_info, interaction, side_effects, storage_method, data_source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
             item_name = excluded.item_name,
             entp_name = excluded.entp_name,
             efficacy = excluded.efficacy,
             use_method = excluded.use_method,
             warning_info = excluded.warning_info,
             caution_info = excluded.caution_info,
             interaction = excluded.interaction,
             side_effects = excluded.side_effects,
             storage_method = excluded.storage_method,
             data_source = excluded.data_source,
             updated_at = datetime('now')",
        params![
            drug.id,
            drug.item_name,
            drug.entp_name,
            drug.efficacy,
            drug.use_method,
            drug.warning_info,
            drug.caution_info,
            drug.interaction,
            drug.side_effects,
            drug.storage_method,
            drug.data_source,
        ],
    )?;
    Ok(())
}

pub fn get_drug(conn: &Connection, id: &str) -> Result<Option<Drug>, DatabaseError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {DRUG_COLUMNS} FROM drugs WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id], drug_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub fn list_drugs(
    conn: &Connection,
    limit: usize,
    offset: usize,
) -> Result<Vec<Drug>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRUG_COLUMNS} FROM drugs ORDER BY item_name LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt.query_map(params![limit as i64, offset as i64], drug_from_row)?;

    let mut drugs = Vec::new();
    for row in rows {
        drugs.push(row?);
    }
    Ok(drugs)
}

/// All drugs carrying efficacy text, the lexical-index corpus.
pub fn drugs_with_efficacy(conn: &Connection) -> Result<Vec<Drug>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRUG_COLUMNS} FROM drugs WHERE efficacy IS NOT NULL"
    ))?;
    let rows = stmt.query_map([], drug_from_row)?;

    let mut drugs = Vec::new();
    for row in rows {
        drugs.push(row?);
    }
    Ok(drugs)
}

pub fn all_drugs(conn: &Connection) -> Result<Vec<Drug>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {DRUG_COLUMNS} FROM drugs"))?;
    let rows = stmt.query_map([], drug_from_row)?;

    let mut drugs = Vec::new();
    for row in rows {
        drugs.push(row?);
    }
    Ok(drugs)
}

pub fn count_drugs(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM drugs", [], |r| r.get(0))?)
}
