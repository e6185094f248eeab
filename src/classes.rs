use rocket::response::status::Created;
use rocket::serde::json::{self, Json};
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use crate::changes::{ChangeFeed, StudentChange};
use crate::datetime::Timestamp;
use crate::db::DbPool;
use crate::error::{parse_record_id, ApiError, ApiResult, MessageBody, OptionExt};
use crate::record_id::RecordId;
use crate::util::{json_body, required_name};

pub type ClassId = RecordId;

pub const CLASS: &str = "Class";

#[derive(Serialize, Deserialize, FromRow, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: ClassId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ClassBody {
    pub name: Option<String>,
}

pub async fn create_class(name: Option<&str>, pool: &SqlitePool) -> ApiResult<ClassRecord> {
    let name = required_name("Class name", name)?;
    let now = Timestamp::now();
    let class = ClassRecord {
        id: RecordId::generate(),
        name,
        created_at: now,
        updated_at: now,
    };
    sqlx::query("INSERT INTO classes (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&class.id)
        .bind(&class.name)
        .bind(class.created_at)
        .bind(class.updated_at)
        .execute(pool)
        .await?;
    info!("Class created, id: {}, name: {}", class.id, class.name);
    Ok(class)
}

pub async fn list_classes(pool: &SqlitePool) -> ApiResult<Vec<ClassRecord>> {
    let classes = sqlx::query_as::<_, ClassRecord>("SELECT id, name, created_at, updated_at FROM classes ORDER BY created_at DESC, rowid DESC")
        .fetch_all(pool)
        .await?;
    Ok(classes)
}

pub async fn load_class(id: &ClassId, pool: &SqlitePool) -> ApiResult<ClassRecord> {
    sqlx::query_as::<_, ClassRecord>("SELECT id, name, created_at, updated_at FROM classes WHERE id=?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .or_not_found(CLASS, id)
}

pub async fn rename_class(id: &ClassId, name: Option<&str>, pool: &SqlitePool) -> ApiResult<ClassRecord> {
    let name = required_name("Class name", name)?;
    sqlx::query_as::<_, ClassRecord>("UPDATE classes SET name=?, updated_at=? WHERE id=? RETURNING id, name, created_at, updated_at")
        .bind(name)
        .bind(Timestamp::now())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .or_not_found(CLASS, id)
}

/// Deletes the class together with all of its students, returns the number of students removed.
pub async fn delete_class(id: &ClassId, pool: &SqlitePool) -> ApiResult<u64> {
    let mut txn = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM classes WHERE id=?")
        .bind(id)
        .execute(&mut *txn)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound { kind: CLASS, id: id.clone() });
    }
    let students = sqlx::query("DELETE FROM students WHERE class_id=?")
        .bind(id)
        .execute(&mut *txn)
        .await?;
    txn.commit().await?;
    info!("Class deleted, id: {id}, students removed: {}", students.rows_affected());
    Ok(students.rows_affected())
}

#[get("/classes")]
async fn get_classes(db: &State<DbPool>) -> ApiResult<Json<Vec<ClassRecord>>> {
    let classes = list_classes(&db.0).await?;
    Ok(Json(classes))
}

#[post("/classes", data = "<body>")]
async fn post_class<'r>(body: Result<Json<ClassBody>, json::Error<'r>>, db: &State<DbPool>) -> ApiResult<Created<Json<ClassRecord>>> {
    let body = json_body(body)?;
    let class = create_class(body.name.as_deref(), &db.0).await?;
    Ok(Created::new(format!("/api/classes/{}", class.id)).body(Json(class)))
}

#[get("/classes/<id>")]
async fn get_class(id: &str, db: &State<DbPool>) -> ApiResult<Json<ClassRecord>> {
    let id = parse_record_id(CLASS, id)?;
    let class = load_class(&id, &db.0).await?;
    Ok(Json(class))
}

#[patch("/classes/<id>", data = "<body>")]
async fn patch_class<'r>(id: &str, body: Result<Json<ClassBody>, json::Error<'r>>, db: &State<DbPool>) -> ApiResult<Json<ClassRecord>> {
    let id = parse_record_id(CLASS, id)?;
    let body = json_body(body)?;
    let class = rename_class(&id, body.name.as_deref(), &db.0).await?;
    Ok(Json(class))
}

#[delete("/classes/<id>")]
async fn delete_class_route(id: &str, db: &State<DbPool>, feed: &State<ChangeFeed>) -> ApiResult<Json<MessageBody>> {
    let id = parse_record_id(CLASS, id)?;
    delete_class(&id, &db.0).await?;
    feed.publish(&id, StudentChange::ClassDeleted);
    Ok(Json(MessageBody { message: "Class deleted".to_string() }))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api", routes![
            get_classes,
            post_class,
            get_class,
            patch_class,
            delete_class_route,
        ])
}
