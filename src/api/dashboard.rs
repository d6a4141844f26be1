use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{Caller, Role};
use crate::db::{
    AttendanceFilter, GradeFilter, ListFilter, UserCounts, attendance_summary, average_marks,
    count_classrooms, count_students, count_subjects, count_teachers, count_users_by_role,
    get_student, get_teacher, list_attendance, list_classrooms, list_fees, list_grades, list_notices,
    list_subjects, list_timetable, outstanding_fees,
};
use crate::models::{Attendance, ClassRoom, Fee, Grade, Notice, Student, Subject, Teacher, TimetableSlot};
use crate::scope::Scope;
use crate::validation::ApiResult;

use super::{ADMIN_ONLY, admit_scoped};

const RECENT_NOTICES: i64 = 5;
const RECENT_ATTENDANCE: usize = 10;

#[derive(Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub present: i64,
    pub absent: i64,
}

#[derive(Serialize, Deserialize)]
pub struct AdminDashboard {
    pub users: UserCounts,
    pub classrooms: i64,
    pub subjects: i64,
    pub teachers: i64,
    pub students: i64,
    pub outstanding_fees: f64,
    pub recent_notices: Vec<Notice>,
}

#[derive(Serialize, Deserialize)]
pub struct TeacherDashboard {
    pub teacher: Option<Teacher>,
    pub subjects: Vec<Subject>,
    pub classrooms: Vec<ClassRoom>,
    pub students: i64,
    pub attendance: AttendanceSummary,
    pub average_marks: Option<f64>,
    pub timetable: Vec<TimetableSlot>,
    pub recent_notices: Vec<Notice>,
}

#[derive(Serialize, Deserialize)]
pub struct StudentDashboard {
    pub student: Option<Student>,
    pub grades: Vec<Grade>,
    pub recent_attendance: Vec<Attendance>,
    pub attendance: AttendanceSummary,
    pub fees: Vec<Fee>,
    pub timetable: Vec<TimetableSlot>,
    pub recent_notices: Vec<Notice>,
}

async fn summary(db: &SqlitePool, scope: &Scope) -> ApiResult<AttendanceSummary> {
    let (present, absent) = attendance_summary(db, scope).await?;
    Ok(AttendanceSummary { present, absent })
}

#[get("/admin-dashboard")]
pub async fn api_admin_dashboard(
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<AdminDashboard>> {
    let (_, scope) = admit_scoped(&caller, ADMIN_ONLY, db).await?;

    Ok(Json(AdminDashboard {
        users: count_users_by_role(db).await?,
        classrooms: count_classrooms(db, &scope).await?,
        subjects: count_subjects(db, &scope).await?,
        teachers: count_teachers(db, &scope).await?,
        students: count_students(db, &scope).await?,
        outstanding_fees: outstanding_fees(db, &scope).await?,
        recent_notices: list_notices(db, Some(RECENT_NOTICES)).await?,
    }))
}

#[get("/teacher-dashboard")]
pub async fn api_teacher_dashboard(
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<TeacherDashboard>> {
    let (_, scope) = admit_scoped(&caller, &[Role::Teacher], db).await?;

    let teacher = match scope {
        Scope::Teacher { teacher_id } => Some(get_teacher(db, teacher_id).await?),
        _ => None,
    };
    let filter = ListFilter::default();

    Ok(Json(TeacherDashboard {
        teacher,
        subjects: list_subjects(db, &scope, &filter).await?,
        classrooms: list_classrooms(db, &scope, &filter).await?,
        students: count_students(db, &scope).await?,
        attendance: summary(db, &scope).await?,
        average_marks: average_marks(db, &scope).await?,
        timetable: list_timetable(db, &scope, None).await?,
        recent_notices: list_notices(db, Some(RECENT_NOTICES)).await?,
    }))
}

#[get("/student-dashboard")]
pub async fn api_student_dashboard(
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<StudentDashboard>> {
    let (_, scope) = admit_scoped(&caller, &[Role::Student], db).await?;

    let student = match scope {
        Scope::Student { student_id, .. } => Some(get_student(db, student_id).await?),
        _ => None,
    };

    let mut recent_attendance =
        list_attendance(db, &scope, &AttendanceFilter::default()).await?;
    recent_attendance.truncate(RECENT_ATTENDANCE);

    Ok(Json(StudentDashboard {
        student,
        grades: list_grades(db, &scope, &GradeFilter::default()).await?,
        recent_attendance,
        attendance: summary(db, &scope).await?,
        fees: list_fees(db, &scope, None).await?,
        timetable: list_timetable(db, &scope, None).await?,
        recent_notices: list_notices(db, Some(RECENT_NOTICES)).await?,
    }))
}

pub fn routes() -> Vec<Route> {
    routes![api_admin_dashboard, api_teacher_dashboard, api_student_dashboard]
}
