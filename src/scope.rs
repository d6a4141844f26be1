use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{instrument, warn};

use crate::auth::{Role, User};
use crate::error::AppError;

/// Classrooms offering at least one of a teacher's subjects. Takes the
/// teacher id as its single bind.
const TEACHER_CLASSROOMS: &str = "SELECT cs.classroom_id FROM classroom_subjects cs
     JOIN teacher_subjects ts ON ts.subject_id = cs.subject_id
     WHERE ts.teacher_id = ";

/// What a caller is allowed to see, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Teacher { teacher_id: i64 },
    Student { student_id: i64, classroom_id: i64 },
    Nothing,
}

impl Scope {
    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn for_user(pool: &SqlitePool, user: &User) -> Result<Scope, AppError> {
        if user.is_admin_equivalent() {
            return Ok(Scope::All);
        }

        let scope = match user.role {
            Some(Role::Teacher) => {
                sqlx::query_scalar::<_, i64>("SELECT id FROM teachers WHERE user_id = ?")
                    .bind(user.id)
                    .fetch_optional(pool)
                    .await?
                    .map(|teacher_id| Scope::Teacher { teacher_id })
            }
            Some(Role::Student) => {
                sqlx::query_as::<_, (i64, i64)>(
                    "SELECT id, classroom_id FROM students WHERE user_id = ?",
                )
                .bind(user.id)
                .fetch_optional(pool)
                .await?
                .map(|(student_id, classroom_id)| Scope::Student {
                    student_id,
                    classroom_id,
                })
            }
            _ => None,
        };

        Ok(scope.unwrap_or_else(|| {
            warn!(username = %user.username, "Caller has no usable profile, scoping to nothing");
            Scope::Nothing
        }))
    }

    pub fn restrict_classrooms(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        match *self {
            Scope::All => {}
            Scope::Teacher { teacher_id } => {
                qb.push(" AND ")
                    .push(column)
                    .push(" IN (")
                    .push(TEACHER_CLASSROOMS)
                    .push_bind(teacher_id)
                    .push(")");
            }
            Scope::Student { classroom_id, .. } => {
                qb.push(" AND ").push(column).push(" = ").push_bind(classroom_id);
            }
            Scope::Nothing => {
                qb.push(" AND 0");
            }
        }
    }

    pub fn restrict_subjects(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        match *self {
            Scope::All => {}
            Scope::Teacher { teacher_id } => {
                qb.push(" AND ")
                    .push(column)
                    .push(" IN (SELECT subject_id FROM teacher_subjects WHERE teacher_id = ")
                    .push_bind(teacher_id)
                    .push(")");
            }
            Scope::Student { classroom_id, .. } => {
                qb.push(" AND ")
                    .push(column)
                    .push(" IN (SELECT subject_id FROM classroom_subjects WHERE classroom_id = ")
                    .push_bind(classroom_id)
                    .push(")");
            }
            Scope::Nothing => {
                qb.push(" AND 0");
            }
        }
    }

    pub fn restrict_teachers(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        match *self {
            Scope::All => {}
            Scope::Teacher { teacher_id } => {
                qb.push(" AND ").push(column).push(" = ").push_bind(teacher_id);
            }
            Scope::Student { classroom_id, .. } => {
                qb.push(" AND ")
                    .push(column)
                    .push(
                        " IN (SELECT ts.teacher_id FROM teacher_subjects ts
                         JOIN classroom_subjects cs ON cs.subject_id = ts.subject_id
                         WHERE cs.classroom_id = ",
                    )
                    .push_bind(classroom_id)
                    .push(")");
            }
            Scope::Nothing => {
                qb.push(" AND 0");
            }
        }
    }

    /// `column` holds a student id.
    pub fn restrict_students(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        match *self {
            Scope::All => {}
            Scope::Teacher { teacher_id } => {
                qb.push(" AND ")
                    .push(column)
                    .push(" IN (SELECT id FROM students WHERE classroom_id IN (")
                    .push(TEACHER_CLASSROOMS)
                    .push_bind(teacher_id)
                    .push("))");
            }
            Scope::Student { student_id, .. } => {
                qb.push(" AND ").push(column).push(" = ").push_bind(student_id);
            }
            Scope::Nothing => {
                qb.push(" AND 0");
            }
        }
    }

    /// Grades are visible to a teacher only for reachable students in the
    /// teacher's own subjects.
    pub fn restrict_grades(
        &self,
        qb: &mut QueryBuilder<'_, Sqlite>,
        student_column: &str,
        subject_column: &str,
    ) {
        self.restrict_students(qb, student_column);
        if let Scope::Teacher { .. } = self {
            self.restrict_subjects(qb, subject_column);
        }
    }

    pub fn restrict_timetable(
        &self,
        qb: &mut QueryBuilder<'_, Sqlite>,
        teacher_column: &str,
        classroom_column: &str,
    ) {
        match *self {
            Scope::Teacher { teacher_id } => {
                qb.push(" AND (")
                    .push(teacher_column)
                    .push(" = ")
                    .push_bind(teacher_id)
                    .push(" OR ")
                    .push(classroom_column)
                    .push(" IN (")
                    .push(TEACHER_CLASSROOMS)
                    .push_bind(teacher_id)
                    .push("))");
            }
            _ => self.restrict_classrooms(qb, classroom_column),
        }
    }
}

/// Turns a failed visibility check into a Forbidden error.
pub fn ensure_visible(visible: bool, entity: &str, id: i64) -> Result<(), AppError> {
    if visible {
        Ok(())
    } else {
        Err(AppError::Authorization(format!(
            "{} {} is outside the caller's scope",
            entity, id
        )))
    }
}
