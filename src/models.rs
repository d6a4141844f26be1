use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const GENDERS: &[&str] = &["Male", "Female", "Other"];
pub const ATTENDANCE_STATUSES: &[&str] = &["Present", "Absent"];
pub const FEE_STATUSES: &[&str] = &["Paid", "Pending", "Overdue"];
pub const DAYS_OF_WEEK: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClassRoom {
    pub id: i64,
    pub name: String,
    pub section: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub subject_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Teacher {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub gender: String,
    pub contact: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub subject_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub address: Option<String>,
    pub parent_contact: Option<String>,
    pub classroom_id: i64,
    pub classroom_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Grade {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub marks: f64,
    pub grade: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimetableSlot {
    pub id: i64,
    pub classroom_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub day_of_week: String,
    pub period_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fee {
    pub id: i64,
    pub student_id: i64,
    pub amount: f64,
    pub status: String,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notice {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub posted_by: i64,
    pub posted_at: Option<NaiveDateTime>,
}

/// Letter grade for a mark out of 100.
pub fn letter_grade(marks: f64) -> &'static str {
    match marks {
        m if m >= 90.0 => "A",
        m if m >= 80.0 => "B",
        m if m >= 70.0 => "C",
        m if m >= 60.0 => "D",
        _ => "F",
    }
}
