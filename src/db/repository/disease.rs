use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::Disease;

fn disease_from_row(row: &Row) -> rusqlite::Result<Disease> {
    Ok(Disease {
        id: row.get(0)?,
        name: row.get(1)?,
        name_en: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        causes: row.get(5)?,
        symptoms: row.get(6)?,
        diagnosis: row.get(7)?,
        treatment: row.get(8)?,
        prevention: row.get(9)?,
        related_drugs: row.get(10)?,
    })
}

const DISEASE_COLUMNS: &str = "id, name, name_en, category, description, causes, symptoms,
     diagnosis, treatment, prevention, related_drugs";

pub fn upsert_disease(conn: &Connection, disease: &Disease) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO diseases (id, name, name_en, category, description, causes, symptoms,
         diagnosis, treatment, prevention, related_drugs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             name_en = excluded.name_en,
             category = excluded.category,
             description = excluded.description,
             causes = excluded.causes,
             symptoms = excluded.symptoms,
             diagnosis = excluded.diagnosis,
             treatment = excluded.treatment,
             prevention = excluded.prevention,
             related_drugs = excluded.related_drugs,
             updated_at = datetime('now')",
        params![
            disease.id,
            disease.name,
            disease.name_en,
            disease.category,
            disease.description,
            disease.causes,
            disease.symptoms,
            disease.diagnosis,
            disease.treatment,
            disease.prevention,
            disease.related_drugs,
        ],
    )?;
    Ok(())
}

pub fn get_disease(conn: &Connection, id: &str) -> Result<Option<Disease>, DatabaseError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {DISEASE_COLUMNS} FROM diseases WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id], disease_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub fn all_diseases(conn: &Connection) -> Result<Vec<Disease>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {DISEASE_COLUMNS} FROM diseases"))?;
    let rows = stmt.query_map([], disease_from_row)?;

    let mut diseases = Vec::new();
    for row in rows {
        diseases.push(row?);
    }
    Ok(diseases)
}

pub fn count_diseases(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM diseases", [], |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn cold() -> Disease {
        Disease {
            id: "DIS001".to_string(),
            name: "감기".to_string(),
            name_en: Some("Common cold".to_string()),
            category: Some("호흡기".to_string()),
            description: Some("상기도 바이러스 감염".to_string()),
            causes: Some("리노바이러스 등".to_string()),
            symptoms: Some("콧물, 기침, 인후통".to_string()),
            diagnosis: None,
            treatment: Some("대증 요법".to_string()),
            prevention: Some("손 씻기".to_string()),
            related_drugs: None,
        }
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        upsert_disease(&conn, &cold()).unwrap();

        let found = get_disease(&conn, "DIS001").unwrap().unwrap();
        assert_eq!(found.name, "감기");
        assert_eq!(found.symptoms.as_deref(), Some("콧물, 기침, 인후통"));
    }

    #[test]
    fn upsert_replaces_existing() {
        let conn = open_memory_database().unwrap();
        upsert_disease(&conn, &cold()).unwrap();

        let mut changed = cold();
        changed.treatment = Some("휴식과 수분 섭취".to_string());
        upsert_disease(&conn, &changed).unwrap();

        assert_eq!(count_diseases(&conn).unwrap(), 1);
        let found = get_disease(&conn, "DIS001").unwrap().unwrap();
        assert_eq!(found.treatment.as_deref(), Some("휴식과 수분 섭취"));
    }
}
