use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_patient(conn: &Connection, patient: &NewPatient) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO patients (pharmacy_id, first_name, last_name) VALUES (?1, ?2, ?3)",
        params![patient.pharmacy_id, patient.first_name, patient.last_name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_therapy(conn: &Connection, therapy: &NewTherapy) -> Result<i64, DatabaseError> {
    if let Some(patient_id) = therapy.patient_id {
        let owned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?1 AND pharmacy_id = ?2)",
            params![patient_id, therapy.pharmacy_id],
            |row| row.get(0),
        )?;
        if !owned {
            return Err(DatabaseError::NotFound {
                entity_type: "Patient".into(),
                id: patient_id.to_string(),
            });
        }
    }

    conn.execute(
        "INSERT INTO therapies (pharmacy_id, patient_id, therapy_title) VALUES (?1, ?2, ?3)",
        params![therapy.pharmacy_id, therapy.patient_id, therapy.therapy_title],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_therapy_for_pharmacy(
    conn: &Connection,
    pharmacy_id: i64,
    therapy_id: i64,
) -> Result<Option<Therapy>, DatabaseError> {
    let therapy = conn
        .query_row(
            "SELECT id, pharmacy_id, patient_id, therapy_title, status
             FROM therapies WHERE id = ?1 AND pharmacy_id = ?2",
            params![therapy_id, pharmacy_id],
            |row| {
                Ok(Therapy {
                    id: row.get(0)?,
                    pharmacy_id: row.get(1)?,
                    patient_id: row.get(2)?,
                    therapy_title: row.get(3)?,
                    status: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(therapy)
}

/// Tenant check used before attaching a reminder to a therapy.
pub fn therapy_exists_for_pharmacy(
    conn: &Connection,
    pharmacy_id: i64,
    therapy_id: i64,
) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM therapies WHERE id = ?1 AND pharmacy_id = ?2)",
        params![therapy_id, pharmacy_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}
