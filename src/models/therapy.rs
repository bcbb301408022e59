use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub pharmacy_id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Therapy {
    pub id: i64,
    pub pharmacy_id: i64,
    pub patient_id: Option<i64>,
    pub therapy_title: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTherapy {
    pub pharmacy_id: i64,
    pub patient_id: Option<i64>,
    pub therapy_title: String,
}
