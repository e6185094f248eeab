use rocket::http::{ContentType, Status};
use rocket::local::blocking::{Client, LocalResponse};
use serde_json::{json, Value};
use crate::classes::ClassRecord;
use crate::db::DbPool;
use crate::error::{ErrorBody, MessageBody};
use crate::grades::GRADES_COUNT;
use crate::students::StudentView;

const MISSING_ID: &str = "0123456789abcdef01234567";

fn create_test_server() -> Client {
    Client::tracked(super::rocket()).unwrap()
}

fn create_class(client: &Client, name: &str) -> ClassRecord {
    let resp = client.post("/api/classes")
        .json(&json!({"name": name}))
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    resp.into_json::<ClassRecord>().unwrap()
}

fn create_student(client: &Client, class: &ClassRecord, body: Value) -> StudentView {
    let resp = client.post(format!("/api/classes/{}/students", class.id))
        .json(&body)
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    resp.into_json::<StudentView>().unwrap()
}

fn list_students(client: &Client, class: &ClassRecord) -> Vec<StudentView> {
    let resp = client.get(format!("/api/classes/{}/students", class.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    resp.into_json::<Vec<StudentView>>().unwrap()
}

fn assert_error(resp: LocalResponse<'_>, status: Status) -> String {
    assert_eq!(resp.status(), status);
    assert_eq!(resp.content_type(), Some(ContentType::JSON));
    resp.into_json::<ErrorBody>().unwrap().error
}

#[test]
fn class_lifecycle() {
    let client = create_test_server();

    let resp = client.get("/api/classes").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert!(resp.into_json::<Vec<ClassRecord>>().unwrap().is_empty());

    let a = create_class(&client, "  A  ");
    assert_eq!(a.name, "A");
    assert_eq!(a.created_at, a.updated_at);
    let b = create_class(&client, "B");

    // newest first
    let resp = client.get("/api/classes").dispatch();
    let classes = resp.into_json::<Vec<ClassRecord>>().unwrap();
    assert_eq!(classes.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["B", "A"]);

    let resp = client.patch(format!("/api/classes/{}", a.id))
        .json(&json!({"name": "A2"}))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let renamed = resp.into_json::<ClassRecord>().unwrap();
    assert_eq!(renamed.id, a.id);
    assert_eq!(renamed.name, "A2");
    assert_eq!(renamed.created_at, a.created_at);
    assert!(renamed.updated_at >= a.updated_at);

    let resp = client.get(format!("/api/classes/{}", a.id)).dispatch();
    assert_eq!(resp.into_json::<ClassRecord>().unwrap().name, "A2");

    let resp = client.delete(format!("/api/classes/{}", b.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.into_json::<MessageBody>().unwrap().message, "Class deleted");

    let resp = client.get(format!("/api/classes/{}", b.id)).dispatch();
    assert_error(resp, Status::NotFound);
    let resp = client.delete(format!("/api/classes/{}", b.id)).dispatch();
    assert_error(resp, Status::NotFound);
}

#[test]
fn class_validation() {
    let client = create_test_server();

    for body in [json!({"name": "   "}), json!({}), json!({"name": 42})] {
        let resp = client.post("/api/classes").json(&body).dispatch();
        assert_error(resp, Status::BadRequest);
    }
    let resp = client.post("/api/classes")
        .header(ContentType::JSON)
        .body("{not json")
        .dispatch();
    assert_error(resp, Status::BadRequest);

    let resp = client.patch("/api/classes/not-an-id")
        .json(&json!({"name": "X"}))
        .dispatch();
    assert_error(resp, Status::BadRequest);
    let resp = client.delete("/api/classes/123").dispatch();
    assert_error(resp, Status::BadRequest);

    let resp = client.patch(format!("/api/classes/{MISSING_ID}"))
        .json(&json!({"name": "X"}))
        .dispatch();
    assert_error(resp, Status::NotFound);
    // name is checked before the class is looked up
    let resp = client.patch(format!("/api/classes/{MISSING_ID}"))
        .json(&json!({"name": ""}))
        .dispatch();
    assert_error(resp, Status::BadRequest);

    let resp = client.get("/api/no-such-route").dispatch();
    assert_error(resp, Status::NotFound);
}

#[test]
fn grade_sheet_example() {
    let client = create_test_server();
    let class = create_class(&client, "A");

    let omar = create_student(&client, &class, json!({"name": "Omar"}));
    assert_eq!(omar.class_id, class.id);
    assert_eq!(omar.grades.0, vec![0.0; GRADES_COUNT]);
    assert_eq!(omar.total, 0.0);
    assert_eq!(omar.average, 0.0);
    assert_eq!(omar.number, None);

    let resp = client.patch(format!("/api/students/{}", omar.id))
        .json(&json!({"grades": vec![10; GRADES_COUNT]}))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let omar = resp.into_json::<StudentView>().unwrap();
    assert_eq!(omar.total, 120.0);
    assert_eq!(omar.average, 10.0);

    let students = list_students(&client, &class);
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].grades.0, vec![10.0; GRADES_COUNT]);
    assert_eq!(students[0].total, 120.0);
}

#[test]
fn wrong_length_grades_are_rejected() {
    let client = create_test_server();
    let class = create_class(&client, "A");
    let student = create_student(&client, &class, json!({"name": "Omar"}));

    let grades = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 0, 5];
    let resp = client.patch(format!("/api/students/{}", student.id))
        .json(&json!({"grades": grades}))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);

    for body in [
        json!({"grades": [5]}),
        json!({"grades": vec![1; GRADES_COUNT + 1]}),
        json!({"grades": []}),
        json!({"grades": "10"}),
        json!({"grades": null}),
        json!({"name": "Renamed", "grades": [5]}),
    ] {
        let resp = client.patch(format!("/api/students/{}", student.id))
            .json(&body)
            .dispatch();
        assert_error(resp, Status::BadRequest);
    }

    let resp = client.get(format!("/api/students/{}", student.id)).dispatch();
    let stored = resp.into_json::<StudentView>().unwrap();
    assert_eq!(stored.name, "Omar");
    assert_eq!(stored.grades.0, grades.iter().map(|&g| g as f64).collect::<Vec<_>>());
    assert_eq!(stored.total, 60.0);
    assert_eq!(stored.average, 5.0);
}

#[test]
fn grade_elements_are_clamped() {
    let client = create_test_server();
    let class = create_class(&client, "A");
    let student = create_student(&client, &class, json!({"name": "Omar"}));

    let resp = client.patch(format!("/api/students/{}", student.id))
        .json(&json!({"grades": [11, -1, "inf", "7", 9.5, null, true, 3, 3, 3, 3, 100]}))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let student = resp.into_json::<StudentView>().unwrap();
    assert_eq!(student.grades.0, vec![10.0, 0.0, 0.0, 7.0, 9.5, 0.0, 1.0, 3.0, 3.0, 3.0, 3.0, 10.0]);
    assert_eq!(student.total, 49.5);
    assert_eq!(student.average, 49.5 / 12.0);
}

#[test]
fn student_partial_update() {
    let client = create_test_server();
    let class = create_class(&client, "A");
    let student = create_student(&client, &class, json!({"name": " Omar ", "number": " 17 "}));
    assert_eq!(student.name, "Omar");
    assert_eq!(student.number.as_deref(), Some("17"));

    let resp = client.patch(format!("/api/students/{}", student.id))
        .json(&json!({"name": "Omar K."}))
        .dispatch();
    let updated = resp.into_json::<StudentView>().unwrap();
    assert_eq!(updated.name, "Omar K.");
    assert_eq!(updated.number.as_deref(), Some("17"));
    assert_eq!(updated.created_at, student.created_at);

    let resp = client.patch(format!("/api/students/{}", student.id))
        .json(&json!({"number": "  "}))
        .dispatch();
    let updated = resp.into_json::<StudentView>().unwrap();
    assert_eq!(updated.name, "Omar K.");
    assert_eq!(updated.number, None);

    for body in [json!({}), json!({"name": "  "}), json!({"name": null})] {
        let resp = client.patch(format!("/api/students/{}", student.id))
            .json(&body)
            .dispatch();
        assert_error(resp, Status::BadRequest);
    }

    let resp = client.patch(format!("/api/students/{MISSING_ID}"))
        .json(&json!({"name": "X"}))
        .dispatch();
    assert_error(resp, Status::NotFound);
    let resp = client.patch("/api/students/xyz")
        .json(&json!({"name": "X"}))
        .dispatch();
    assert_error(resp, Status::BadRequest);
}

#[test]
fn students_listed_in_creation_order() {
    let client = create_test_server();
    let class = create_class(&client, "A");
    let other = create_class(&client, "B");
    for name in ["Zaid", "Ali", "Omar"] {
        create_student(&client, &class, json!({"name": name}));
    }
    create_student(&client, &other, json!({"name": "Huda"}));

    let students = list_students(&client, &class);
    assert_eq!(students.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["Zaid", "Ali", "Omar"]);
    assert!(students.iter().all(|s| s.class_id == class.id));

    let resp = client.get(format!("/api/classes/{MISSING_ID}/students")).dispatch();
    assert_error(resp, Status::NotFound);
    let resp = client.get("/api/classes/bad/students").dispatch();
    assert_error(resp, Status::BadRequest);

    let resp = client.post(format!("/api/classes/{}/students", class.id))
        .json(&json!({"name": ""}))
        .dispatch();
    assert_error(resp, Status::BadRequest);
}

#[test]
fn delete_student() {
    let client = create_test_server();
    let class = create_class(&client, "A");
    let omar = create_student(&client, &class, json!({"name": "Omar"}));
    let ali = create_student(&client, &class, json!({"name": "Ali"}));

    let resp = client.delete(format!("/api/students/{}", omar.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.into_json::<MessageBody>().unwrap().message, "Student deleted");

    let students = list_students(&client, &class);
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].id, ali.id);

    let resp = client.delete(format!("/api/students/{}", omar.id)).dispatch();
    assert_error(resp, Status::NotFound);
    let resp = client.get(format!("/api/students/{}", omar.id)).dispatch();
    assert_error(resp, Status::NotFound);
}

#[test]
fn students_sse_checks_class() {
    let client = create_test_server();

    let resp = client.get("/api/classes/bad/students/sse").dispatch();
    assert_error(resp, Status::BadRequest);
    let resp = client.get(format!("/api/classes/{MISSING_ID}/students/sse")).dispatch();
    let error = assert_error(resp, Status::NotFound);
    assert!(error.contains(MISSING_ID));
}

#[test]
fn export_csv() {
    let client = create_test_server();
    let class = create_class(&client, "A");
    let omar = create_student(&client, &class, json!({"name": "Omar", "number": "7"}));
    create_student(&client, &class, json!({"name": "Ali"}));
    client.patch(format!("/api/students/{}", omar.id))
        .json(&json!({"grades": vec![10; GRADES_COUNT]}))
        .dispatch();

    let resp = client.get(format!("/api/classes/{}/students.csv", class.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.content_type(), Some(ContentType::CSV));
    let body = resp.into_string().unwrap();
    let lines = body.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("name,number,g1,"));
    assert!(lines[1].starts_with("Omar,7,10,"));
    assert!(lines[1].ends_with(",120,10.00"));
    assert!(lines[2].ends_with(",0,0.00"));

    let resp = client.get(format!("/api/classes/{MISSING_ID}/students.csv")).dispatch();
    assert_error(resp, Status::NotFound);
}

#[test]
fn html_pages() {
    let client = create_test_server();
    let class = create_class(&client, "Grade 5");
    let omar = create_student(&client, &class, json!({"name": "Omar"}));
    create_student(&client, &class, json!({"name": "Ali"}));
    client.patch(format!("/api/students/{}", omar.id))
        .json(&json!({"grades": vec![9; GRADES_COUNT]}))
        .dispatch();

    let resp = client.get("/").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.content_type(), Some(ContentType::HTML));
    let body = resp.into_string().unwrap();
    assert!(body.contains("Grade 5"));
    assert!(body.contains(&format!("/class/{}", class.id)));

    let resp = client.get(format!("/class/{}?sort=average&order=desc", class.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    let omar_pos = body.find(&format!("data-student-id=\"{}\"", omar.id)).unwrap();
    let ali_pos = body.find(">Ali<").unwrap();
    assert!(omar_pos < ali_pos);
    assert!(body.contains("9.00"));
    assert!(body.contains("data-max-grade="));

    let resp = client.get(format!("/class/{}?q=ali", class.id)).dispatch();
    let body = resp.into_string().unwrap();
    assert!(body.contains(">Ali<"));
    assert!(!body.contains(">Omar<"));

    let resp = client.get(format!("/print/class/{}", class.id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains("Students: 2"));
    assert!(body.find(">Ali<").unwrap() < body.find(">Omar<").unwrap());
    assert!(body.contains("108"));

    let resp = client.get(format!("/class/{MISSING_ID}")).dispatch();
    assert_eq!(resp.status(), Status::NotFound);
}

mod store {
    use rocket::local::asynchronous::Client;
    use crate::classes::{create_class, delete_class};
    use crate::error::ApiError;
    use crate::record_id::RecordId;
    use crate::students::{create_student, NewStudent};
    use super::*;

    async fn count_students(client: &Client, class_id: Option<&RecordId>) -> i64 {
        let pool = &client.rocket().state::<DbPool>().unwrap().0;
        let count: (i64,) = match class_id {
            Some(id) => sqlx::query_as("SELECT COUNT(*) FROM students WHERE class_id=?")
                .bind(id)
                .fetch_one(pool).await.unwrap(),
            None => sqlx::query_as("SELECT COUNT(*) FROM students")
                .fetch_one(pool).await.unwrap(),
        };
        count.0
    }

    #[rocket::async_test]
    async fn student_under_missing_class_is_not_persisted() {
        let client = Client::tracked(crate::rocket()).await.unwrap();
        let pool = &client.rocket().state::<DbPool>().unwrap().0;
        let missing = RecordId::generate();
        let new_student = NewStudent { name: Some("Omar".to_string()), number: None };
        let res = create_student(&missing, &new_student, pool).await;
        assert!(matches!(res, Err(ApiError::NotFound { .. })));

        let resp = client.post(format!("/api/classes/{missing}/students"))
            .json(&json!({"name": "Omar"}))
            .dispatch().await;
        assert_eq!(resp.status(), Status::NotFound);
        assert_eq!(count_students(&client, None).await, 0);
    }

    #[rocket::async_test]
    async fn class_delete_cascades_to_students() {
        let client = Client::tracked(crate::rocket()).await.unwrap();
        let pool = &client.rocket().state::<DbPool>().unwrap().0;
        let doomed = create_class(Some("Doomed"), pool).await.unwrap();
        let kept = create_class(Some("Kept"), pool).await.unwrap();
        for name in ["Omar", "Ali", "Huda"] {
            let new_student = NewStudent { name: Some(name.to_string()), number: None };
            create_student(&doomed.id, &new_student, pool).await.unwrap();
        }
        let new_student = NewStudent { name: Some("Zaid".to_string()), number: Some("3".to_string()) };
        create_student(&kept.id, &new_student, pool).await.unwrap();
        assert_eq!(count_students(&client, Some(&doomed.id)).await, 3);

        let removed = delete_class(&doomed.id, pool).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(count_students(&client, Some(&doomed.id)).await, 0);
        assert_eq!(count_students(&client, Some(&kept.id)).await, 1);

        let resp = client.get(format!("/api/classes/{}/students", doomed.id)).dispatch().await;
        assert_eq!(resp.status(), Status::NotFound);
        assert!(matches!(delete_class(&doomed.id, pool).await, Err(ApiError::NotFound { .. })));
    }
}
