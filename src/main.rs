#[macro_use] extern crate rocket;

use rocket::fairing::AdHoc;
use rocket::fs::{relative, FileServer};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::Request;
use rocket_dyn_templates::handlebars::{Handlebars, Helper};
use rocket_dyn_templates::{handlebars, Template};
use serde::Deserialize;
use crate::datetime::dtstr;
use crate::db::DbPoolFairing;
use crate::error::ErrorBody;
use crate::grades::{GradeBounds, MAX_GRADE, MIN_GRADE};

#[cfg(test)]
mod tests;
mod changes;
mod classes;
mod datetime;
mod db;
mod error;
mod grades;
mod record_id;
mod sheet;
mod students;
mod util;

fn default_min_grade() -> f64 {
    MIN_GRADE
}
fn default_max_grade() -> f64 {
    MAX_GRADE
}

#[derive(Deserialize, Debug)]
struct ConfigValues {
    #[serde(default = "default_min_grade")]
    min_grade: f64,
    #[serde(default = "default_max_grade")]
    max_grade: f64,
}

#[derive(Default, Debug)]
pub struct AppConfig {
    pub grade_bounds: GradeBounds,
}

fn app_config_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Application Config", |rocket| async {
        let values = match rocket.figment().extract::<ConfigValues>() {
            Ok(values) => values,
            Err(err) => {
                error!("Invalid configuration: {err}");
                return Err(rocket);
            }
        };
        match GradeBounds::new(values.min_grade, values.max_grade) {
            Ok(grade_bounds) => {
                info!("Grade bounds: {} ..= {}", grade_bounds.min, grade_bounds.max);
                Ok(rocket.manage(AppConfig { grade_bounds }))
            }
            Err(err) => {
                error!("{err}");
                Err(rocket)
            }
        }
    })
}

#[catch(default)]
fn api_catcher(status: Status, request: &Request) -> Json<ErrorBody> {
    warn!("{} {} -> {}", request.method(), request.uri(), status.code);
    Json(ErrorBody { error: status.reason_lossy().to_string() })
}

#[launch]
fn rocket() -> _ {
    let rocket = rocket::build()
        .attach(Template::custom(|engines| {
            let handlebars = &mut engines.handlebars;

            handlebars.register_helper("stringify",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let param = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("stringify", 0))?;
                                           let json = serde_json::to_string(param.value()).unwrap_or_else(|_| "null".to_string());
                                           out.write(json.as_ref())?;
                                           Ok(())
                                       }));
            handlebars.register_helper("dtstr",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("dtstr", 0))?.value();
                                           let s = dtstr(val.as_str());
                                           out.write(&s)?;
                                           Ok(())
                                       }));
            handlebars.register_helper("inc",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("inc", 0))?.value();
                                           if let Some(n) = val.as_u64() {
                                               out.write(&(n + 1).to_string())?;
                                           }
                                           Ok(())
                                       }));
        }))
        .attach(app_config_fairing())
        .attach(DbPoolFairing())
        .mount("/", FileServer::from(relative!("static")))
        .register("/api", catchers![api_catcher]);
    let rocket = changes::extend(rocket);
    let rocket = classes::extend(rocket);
    let rocket = students::extend(rocket);
    sheet::extend(rocket)
}
