use anyhow::anyhow;
use itertools::Itertools;
use rocket::response::status::Created;
use rocket::serde::json::{self, Json};
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use gradebook_proc_macros::SuppliedFields;
use crate::AppConfig;
use crate::changes::{ChangeFeed, StudentChange};
use crate::classes::{load_class, ClassId, CLASS};
use crate::datetime::Timestamp;
use crate::db::DbPool;
use crate::error::{parse_record_id, ApiError, ApiResult, MessageBody, OptionExt};
use crate::grades::{GradeBounds, GradeVector};
use crate::record_id::RecordId;
use crate::util::{json_body, optional_text, required_name};

pub type StudentId = RecordId;

pub const STUDENT: &str = "Student";

const STUDENT_COLUMNS: &str = "id, class_id, name, number, grades, created_at, updated_at";

#[derive(FromRow, Clone, Debug)]
pub struct StudentRecord {
    pub id: StudentId,
    pub class_id: ClassId,
    pub name: String,
    pub number: Option<String>,
    pub grades: GradeVector,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Student as sent to clients, with the derived total and average.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub id: StudentId,
    pub class_id: ClassId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub grades: GradeVector,
    pub total: f64,
    pub average: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
impl From<StudentRecord> for StudentView {
    fn from(rec: StudentRecord) -> Self {
        let aggregate = rec.grades.aggregate();
        Self {
            id: rec.id,
            class_id: rec.class_id,
            name: rec.name,
            number: rec.number,
            grades: rec.grades,
            total: aggregate.total,
            average: aggregate.average,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct NewStudent {
    pub name: Option<String>,
    pub number: Option<String>,
}

// `null` must stay distinguishable from a missing key
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Partial student update, a field is applied only when the key is present.
#[derive(Deserialize, SuppliedFields, Default, Debug)]
pub struct StudentPatch {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub number: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub grades: Option<Value>,
}

pub async fn create_student(class_id: &ClassId, new_student: &NewStudent, pool: &SqlitePool) -> ApiResult<StudentRecord> {
    load_class(class_id, pool).await?;
    let name = required_name("Student name", new_student.name.as_deref())?;
    let now = Timestamp::now();
    let student = StudentRecord {
        id: RecordId::generate(),
        class_id: class_id.clone(),
        name,
        number: optional_text(new_student.number.as_deref()),
        grades: GradeVector::zeroed(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(&format!("INSERT INTO students ({STUDENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"))
        .bind(&student.id)
        .bind(&student.class_id)
        .bind(&student.name)
        .bind(&student.number)
        .bind(&student.grades)
        .bind(student.created_at)
        .bind(student.updated_at)
        .execute(pool)
        .await?;
    info!("Student created, id: {}, class id: {}", student.id, student.class_id);
    Ok(student)
}

/// Students of the class in creation order.
pub async fn list_students(class_id: &ClassId, pool: &SqlitePool) -> ApiResult<Vec<StudentRecord>> {
    load_class(class_id, pool).await?;
    let students = sqlx::query_as::<_, StudentRecord>(&format!("SELECT {STUDENT_COLUMNS} FROM students WHERE class_id=? ORDER BY created_at, rowid"))
        .bind(class_id)
        .fetch_all(pool)
        .await?;
    Ok(students)
}

pub async fn load_student(id: &StudentId, pool: &SqlitePool) -> ApiResult<StudentRecord> {
    sqlx::query_as::<_, StudentRecord>(&format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id=?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .or_not_found(STUDENT, id)
}

pub async fn update_student(id: &StudentId, patch: &StudentPatch, bounds: &GradeBounds, pool: &SqlitePool) -> ApiResult<StudentRecord> {
    if patch.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }
    let name = match &patch.name {
        Some(name) => Some(required_name("Student name", name.as_deref())?),
        None => None,
    };
    let number = patch.number.as_ref().map(|number| optional_text(number.as_deref()));
    let grades = match &patch.grades {
        Some(values) => Some(GradeVector::from_values(values, bounds)?),
        None => None,
    };
    debug_assert!(grades.as_ref().is_none_or(|g| g.is_valid(bounds)));

    let changed_fields = patch.supplied_fields();
    let placeholders = changed_fields.iter()
        .map(|&fld_name| format!("{fld_name}=?"))
        .chain(std::iter::once("updated_at=?".to_string()))
        .join(", ");
    let qs = format!("UPDATE students SET {placeholders} WHERE id=? RETURNING {STUDENT_COLUMNS}");
    let mut q = sqlx::query_as::<_, StudentRecord>(&qs);
    for field_name in changed_fields {
        q = match field_name {
            "name" => q.bind(name.clone()),
            "number" => q.bind(number.clone().flatten()),
            "grades" => q.bind(grades.clone()),
            _ => return Err(anyhow!("Don't know how to bind field {field_name}").into()),
        };
    }
    let student = q.bind(Timestamp::now())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .or_not_found(STUDENT, id)?;
    debug!("Student updated, id: {id}, total: {}", student.grades.aggregate().total);
    Ok(student)
}

pub async fn delete_student(id: &StudentId, pool: &SqlitePool) -> ApiResult<StudentRecord> {
    sqlx::query_as::<_, StudentRecord>(&format!("DELETE FROM students WHERE id=? RETURNING {STUDENT_COLUMNS}"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .or_not_found(STUDENT, id)
}

#[get("/classes/<class_id>/students")]
async fn get_students(class_id: &str, db: &State<DbPool>) -> ApiResult<Json<Vec<StudentView>>> {
    let class_id = parse_record_id(CLASS, class_id)?;
    let students = list_students(&class_id, &db.0).await?;
    Ok(Json(students.into_iter().map(StudentView::from).collect()))
}

#[post("/classes/<class_id>/students", data = "<body>")]
async fn post_student<'r>(class_id: &str, body: Result<Json<NewStudent>, json::Error<'r>>, db: &State<DbPool>, feed: &State<ChangeFeed>) -> ApiResult<Created<Json<StudentView>>> {
    let class_id = parse_record_id(CLASS, class_id)?;
    let body = json_body(body)?;
    let student = StudentView::from(create_student(&class_id, &body, &db.0).await?);
    feed.publish(&class_id, StudentChange::Created { student: student.clone() });
    Ok(Created::new(format!("/api/students/{}", student.id)).body(Json(student)))
}

#[get("/students/<id>")]
async fn get_student(id: &str, db: &State<DbPool>) -> ApiResult<Json<StudentView>> {
    let id = parse_record_id(STUDENT, id)?;
    let student = load_student(&id, &db.0).await?;
    Ok(Json(student.into()))
}

#[patch("/students/<id>", data = "<body>")]
async fn patch_student<'r>(id: &str, body: Result<Json<StudentPatch>, json::Error<'r>>, cfg: &State<AppConfig>, db: &State<DbPool>, feed: &State<ChangeFeed>) -> ApiResult<Json<StudentView>> {
    let id = parse_record_id(STUDENT, id)?;
    let patch = json_body(body)?;
    let student = StudentView::from(update_student(&id, &patch, &cfg.grade_bounds, &db.0).await?);
    feed.publish(&student.class_id, StudentChange::Updated { student: student.clone() });
    Ok(Json(student))
}

#[delete("/students/<id>")]
async fn delete_student_route(id: &str, db: &State<DbPool>, feed: &State<ChangeFeed>) -> ApiResult<Json<MessageBody>> {
    let id = parse_record_id(STUDENT, id)?;
    let student = delete_student(&id, &db.0).await?;
    info!("Student deleted, id: {id}");
    feed.publish(&student.class_id, StudentChange::Deleted { id });
    Ok(Json(MessageBody { message: "Student deleted".to_string() }))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api", routes![
            get_students,
            post_student,
            get_student,
            patch_student,
            delete_student_route,
        ])
}
