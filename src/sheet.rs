use std::cmp::Ordering;
use anyhow::anyhow;
use rocket::http::ContentType;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use crate::AppConfig;
use crate::classes::{list_classes, load_class, CLASS};
use crate::datetime::Timestamp;
use crate::db::DbPool;
use crate::error::{parse_record_id, ApiResult};
use crate::grades::GRADES_COUNT;
use crate::students::{list_students, StudentView};

pub const AUTOSAVE_DELAY_MSEC: u64 = 600;

#[derive(FromFormField, Serialize, Default, Clone, Copy, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    #[field(value = "name")]
    Name,
    #[field(value = "average")]
    Average,
}

#[derive(FromFormField, Serialize, Default, Clone, Copy, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[field(value = "asc")]
    Asc,
    #[field(value = "desc")]
    Desc,
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Keeps students whose name contains `query` (case-insensitive) and sorts them.
pub fn filter_and_sort(students: Vec<StudentView>, query: Option<&str>, sort: SortField, order: SortOrder) -> Vec<StudentView> {
    let query = query.map(|q| q.trim().to_lowercase()).unwrap_or_default();
    let mut students = students.into_iter()
        .filter(|s| query.is_empty() || s.name.to_lowercase().contains(&query))
        .collect::<Vec<_>>();
    students.sort_by(|a, b| {
        let ord = match sort {
            SortField::Name => compare_names(&a.name, &b.name),
            SortField::Average => a.average.total_cmp(&b.average),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    students
}

#[derive(Serialize, Debug)]
struct SheetRow {
    #[serde(flatten)]
    student: StudentView,
    grades_display: Vec<String>,
    total_display: String,
    average_display: String,
}
impl From<StudentView> for SheetRow {
    fn from(student: StudentView) -> Self {
        Self {
            grades_display: student.grades.0.iter().map(|g| g.to_string()).collect(),
            total_display: student.total.to_string(),
            average_display: format!("{:.2}", student.average),
            student,
        }
    }
}

#[get("/")]
async fn get_dashboard(db: &State<DbPool>) -> ApiResult<Template> {
    let classes = list_classes(&db.0).await?;
    Ok(Template::render("dashboard", context! {
        classes,
    }))
}

#[get("/class/<class_id>?<q>&<sort>&<order>")]
async fn get_class_sheet(class_id: &str, q: Option<&str>, sort: Option<SortField>, order: Option<SortOrder>, cfg: &State<AppConfig>, db: &State<DbPool>) -> ApiResult<Template> {
    let class_id = parse_record_id(CLASS, class_id)?;
    let classrec = load_class(&class_id, &db.0).await?;
    let sort = sort.unwrap_or_default();
    let order = order.unwrap_or_default();
    let students = list_students(&class_id, &db.0).await?
        .into_iter()
        .map(StudentView::from)
        .collect::<Vec<_>>();
    let student_count = students.len();
    let rows = filter_and_sort(students, q, sort, order)
        .into_iter()
        .map(SheetRow::from)
        .collect::<Vec<_>>();
    Ok(Template::render("class", context! {
        classrec,
        rows,
        student_count,
        query: q.unwrap_or_default(),
        sort,
        order,
        grade_numbers: (1..=GRADES_COUNT).collect::<Vec<_>>(),
        grades_count: GRADES_COUNT,
        bounds: cfg.grade_bounds,
        autosave_delay_msec: AUTOSAVE_DELAY_MSEC,
    }))
}

#[get("/print/class/<class_id>")]
async fn get_print_class(class_id: &str, db: &State<DbPool>) -> ApiResult<Template> {
    let class_id = parse_record_id(CLASS, class_id)?;
    let classrec = load_class(&class_id, &db.0).await?;
    let students = list_students(&class_id, &db.0).await?
        .into_iter()
        .map(StudentView::from)
        .collect::<Vec<_>>();
    let student_count = students.len();
    let rows = filter_and_sort(students, None, SortField::Name, SortOrder::Asc)
        .into_iter()
        .map(SheetRow::from)
        .collect::<Vec<_>>();
    Ok(Template::render("print", context! {
        classrec,
        rows,
        student_count,
        grade_numbers: (1..=GRADES_COUNT).collect::<Vec<_>>(),
        print_date: Timestamp::now().to_date_string(),
    }))
}

/// CSV rendering of a class sheet, students in creation order.
pub fn students_to_csv(students: &[StudentView]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let mut header = vec!["name".to_string(), "number".to_string()];
    header.extend((1..=GRADES_COUNT).map(|n| format!("g{n}")));
    header.extend(["total".to_string(), "average".to_string()]);
    writer.write_record(&header)?;
    for student in students {
        let mut record = vec![
            student.name.clone(),
            student.number.clone().unwrap_or_default(),
        ];
        record.extend(student.grades.0.iter().map(|g| g.to_string()));
        record.push(student.total.to_string());
        record.push(format!("{:.2}", student.average));
        writer.write_record(&record)?;
    }
    let data = writer.into_inner().map_err(|e| anyhow!("CSV flush error: {e}"))?;
    Ok(String::from_utf8(data)?)
}

#[get("/classes/<class_id>/students.csv")]
async fn get_students_csv(class_id: &str, db: &State<DbPool>) -> ApiResult<(ContentType, String)> {
    let class_id = parse_record_id(CLASS, class_id)?;
    let students = list_students(&class_id, &db.0).await?
        .into_iter()
        .map(StudentView::from)
        .collect::<Vec<_>>();
    let csv = students_to_csv(&students)?;
    Ok((ContentType::CSV, csv))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", routes![
            get_dashboard,
            get_class_sheet,
            get_print_class,
        ])
        .mount("/api", routes![
            get_students_csv,
        ])
}
