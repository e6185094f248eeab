use log::{debug, error, warn};
use rocket::response::stream::{Event, EventStream};
use rocket::tokio::sync::broadcast;
use rocket::{Build, Rocket, State};
use serde::Serialize;
use crate::classes::{load_class, ClassId, CLASS};
use crate::db::DbPool;
use crate::error::{parse_record_id, ApiResult};
use crate::record_id::RecordId;
use crate::students::StudentView;

const CHANGE_FEED_CAPACITY: usize = 64;

/// What happened to the students of one class.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StudentChange {
    Created { student: StudentView },
    Updated { student: StudentView },
    Deleted { id: RecordId },
    ClassDeleted,
}

/// Fan-out of student changes to every open grade sheet.
pub struct ChangeFeed {
    sender: broadcast::Sender<(ClassId, StudentChange)>,
}
impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { sender }
    }
    pub fn publish(&self, class_id: &ClassId, change: StudentChange) {
        // no subscribers is the common case
        if self.sender.send((class_id.clone(), change)).is_err() {
            debug!("No change feed subscribers for class {class_id}");
        }
    }
    pub fn subscribe(&self) -> broadcast::Receiver<(ClassId, StudentChange)> {
        self.sender.subscribe()
    }
}
impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[get("/classes/<class_id>/students/sse")]
async fn students_changes_sse(class_id: &str, db: &State<DbPool>, feed: &State<ChangeFeed>) -> ApiResult<EventStream![]> {
    let class_id = parse_record_id(CLASS, class_id)?;
    load_class(&class_id, &db.0).await?;
    let mut chng_receiver = feed.subscribe();
    Ok(EventStream! {
        loop {
            let (chng_class_id, change) = match chng_receiver.recv().await {
                Ok(chng) => chng,
                Err(e) => {
                    warn!("Receive student change error: {e}");
                    break;
                }
            };
            if class_id == chng_class_id {
                match serde_json::to_string(&change) {
                    Ok(json) => {
                        yield Event::data(json);
                    }
                    Err(e) => {
                        error!("Serde error: {e}");
                        break;
                    }
                }
            }
        }
    })
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .manage(ChangeFeed::new())
        .mount("/api", routes![
            students_changes_sse,
        ])
}
