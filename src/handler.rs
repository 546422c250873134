use std::time::{SystemTime, UNIX_EPOCH};

use actix_session::Session;
use actix_web::http::header;
use actix_web::{get, post, web, HttpResponse};
use password_auth::{generate_hash, verify_password};

use crate::auth;
use crate::db;
use crate::error::{AppError, Result};
use crate::model::{
    Bar, Item, NewReview, NewUser, RatingBars, ReviewDisplay, ReviewForm, SigninForm, SignupForm,
    User,
};
use crate::AppState;

#[get("/")]
pub async fn index(data: web::Data<AppState>, session: Session) -> Result<HttpResponse> {
    render_main(&data, &session).await
}

#[get("/main")]
pub async fn main_view(data: web::Data<AppState>, session: Session) -> Result<HttpResponse> {
    render_main(&data, &session).await
}

async fn render_main(data: &AppState, session: &Session) -> Result<HttpResponse> {
    let user = auth::current_user(&data.db, session).await?;
    let items = db::all_items(&data.db).await?;
    Ok(html(main_page(user.as_ref(), &items)))
}

#[get("/item/{item_id}")]
pub async fn item(
    data: web::Data<AppState>,
    path: web::Path<i64>,
    session: Session,
) -> Result<HttpResponse> {
    let item_id = path.into_inner();
    let user = auth::current_user(&data.db, &session).await?;

    let item = db::item_by_id(&data.db, item_id)
        .await?
        .ok_or(AppError::NotFound("item"))?;

    // A later review submission targets whatever item this session last viewed.
    session.insert(auth::ITEM_ID_KEY, item_id)?;

    let reviews: Vec<ReviewDisplay> = db::reviews_for_item(&data.db, item_id)
        .await?
        .into_iter()
        .map(|row| row.into_display())
        .collect();
    let bars = db::rating_averages(&data.db, item_id).await?.bars();

    Ok(html(item_page(&item, user.as_ref(), &reviews, &bars)))
}

#[post("/add_review")]
pub async fn add_review(
    data: web::Data<AppState>,
    form: web::Form<ReviewForm>,
    session: Session,
) -> Result<HttpResponse> {
    let user = auth::current_user(&data.db, &session)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let item_id = session
        .get::<i64>(auth::ITEM_ID_KEY)?
        .ok_or(AppError::NotFound("item"))?;

    let text = form.text.as_deref().unwrap_or("");
    if text.is_empty() {
        // Nothing to store, just go back to the item.
        return Ok(redirect(&format!("/item/{item_id}")));
    }

    if !db::item_exists(&data.db, item_id).await? {
        return Err(AppError::NotFound("item"));
    }

    let review = NewReview {
        item_id,
        user_id: user.user_id,
        date: epoch_seconds(),
        text: text.to_string(),
        size: parse_rating(&form.size, "size", 1, 3)?,
        length: parse_rating(&form.length, "length", 1, 3)?,
        thickness: parse_rating(&form.thickness, "thickness", 1, 3)?,
        quality: parse_rating(&form.quality, "quality", 1, 3)?,
        recommend: parse_rating(&form.recommend, "recommend", 1, 2)?,
    };
    db::insert_review(&data.db, &review).await?;
    log::info!("user {} reviewed item {item_id}", user.user_id);

    Ok(redirect(&format!("/item/{item_id}")))
}

#[get("/signin")]
pub async fn signin_page(data: web::Data<AppState>, session: Session) -> Result<HttpResponse> {
    if auth::current_user(&data.db, &session).await?.is_some() {
        return Ok(redirect("/main"));
    }
    Ok(html(signin_body(None)))
}

#[post("/signin")]
pub async fn signin(
    data: web::Data<AppState>,
    form: web::Form<SigninForm>,
    session: Session,
) -> Result<HttpResponse> {
    if auth::current_user(&data.db, &session).await?.is_some() {
        return Ok(redirect("/main"));
    }

    let email = form.email.as_deref().unwrap_or("");
    let Some(user) = db::user_by_email(&data.db, email).await? else {
        return Ok(html(signin_body(Some("User does not exist!"))));
    };

    let password = form.password.as_deref().unwrap_or("");
    if verify_password(password, &user.password_hash).is_err() {
        return Ok(html(signin_body(Some("Password does not match!"))));
    }

    auth::sign_in(&session, &user)?;
    Ok(redirect("/main"))
}

#[get("/signup")]
pub async fn signup_page() -> HttpResponse {
    html(signup_body(None))
}

#[post("/signup")]
pub async fn signup(
    data: web::Data<AppState>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();

    if let Err(msg) = auth::validate_credentials(&form) {
        return Ok(html(signup_body(Some(msg))));
    }

    let email = form.email.as_deref().unwrap_or("");
    if db::user_by_email(&data.db, email).await?.is_some() {
        return Ok(html(signup_body(Some("Email already exists in the database."))));
    }

    if let Err(msg) = auth::validate_profile(&form) {
        return Ok(html(signup_body(Some(msg))));
    }

    let user = NewUser {
        email: email.to_string(),
        name: form.name.unwrap_or_default(),
        password_hash: generate_hash(form.password.as_deref().unwrap_or("")),
        gender: form.gender.unwrap_or_default(),
        height: form.height.unwrap_or_default(),
        top: form.top.unwrap_or_default(),
        bottom: form.bottom.unwrap_or_default(),
        bust: form.bust.unwrap_or_default(),
        shoe_size: form.shoe_size.unwrap_or_default(),
    };

    match db::insert_user(&data.db, &user).await {
        Ok(()) => {}
        // Lost the race against a concurrent signup with the same email.
        Err(AppError::Conflict(_)) => {
            return Ok(html(signup_body(Some("Email already exists in the database."))));
        }
        Err(other) => return Err(other),
    }
    log::info!("new user registered: {}", user.email);

    Ok(redirect("/main"))
}

fn parse_rating(
    field: &Option<String>,
    name: &str,
    min: i64,
    max: i64,
) -> Result<i64> {
    let value = field
        .as_deref()
        .unwrap_or("")
        .parse::<i64>()
        .map_err(|_| AppError::Validation(format!("{name} rating must be a number")))?;
    if !(min..=max).contains(&value) {
        return Err(AppError::Validation(format!(
            "{name} rating must be between {min} and {max}"
        )));
    }
    Ok(value)
}

fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn nav(user: Option<&User>) -> String {
    match user {
        Some(user) => format!(
            "<div class='nav'><span class='user'>Signed in as {}</span></div>",
            escape(&user.name)
        ),
        None => "<div class='nav'><a href='/signin'>Sign in</a> <a href='/signup'>Sign up</a></div>"
            .to_string(),
    }
}

fn main_page(user: Option<&User>, items: &[Item]) -> String {
    let mut listing = String::new();
    for entry in items {
        listing.push_str(&format!(
            "<li><a href='/item/{}'>{}</a></li>",
            entry.item_id,
            escape(&entry.item_name)
        ));
    }
    format!(
        "{}{}<h1>fitreview</h1><ul class='items'>{listing}</ul></body></html>",
        page_head("fitreview"),
        nav(user)
    )
}

fn item_page(entry: &Item, user: Option<&User>, reviews: &[ReviewDisplay], bars: &RatingBars) -> String {
    let mut body = format!(
        "{}{}<h1>{}</h1><img src='{}' alt='{}'>",
        page_head(&entry.item_name),
        nav(user),
        escape(&entry.item_name),
        escape(&entry.item_picture_url),
        escape(&entry.item_name)
    );

    body.push_str("<div class='aggregates'>");
    body.push_str(&bar_markup("Size", &bars.size));
    body.push_str(&bar_markup("Length", &bars.length));
    body.push_str(&bar_markup("Thickness", &bars.thickness));
    body.push_str(&bar_markup("Quality", &bars.quality));
    body.push_str(&bar_markup("Recommend", &bars.recommend));
    body.push_str("</div>");

    body.push_str("<div class='reviews'>");
    for review in reviews {
        body.push_str(&format!(
            "<div class='review'><b>{}</b><p>{}</p><ul><li>{}</li><li>{}</li><li>{}</li><li>{}</li><li>{}</li></ul></div>",
            escape(&review.user_name),
            escape(&review.text),
            review.size,
            review.length,
            review.thickness,
            review.quality,
            review.recommend
        ));
    }
    body.push_str("</div>");

    body.push_str(&review_form());
    body.push_str("</body></html>");
    body
}

fn review_form() -> String {
    let mut form = String::from(
        "<form class='add-review' method='post' action='/add_review'><textarea name='text'></textarea>",
    );
    for (name, max) in [
        ("size", 3),
        ("length", 3),
        ("thickness", 3),
        ("quality", 3),
        ("recommend", 2),
    ] {
        form.push_str(&format!("<select name='{name}'>"));
        for v in 1..=max {
            form.push_str(&format!("<option value='{v}'>{v}</option>"));
        }
        form.push_str("</select>");
    }
    form.push_str("<button type='submit'>Post review</button></form>");
    form
}

fn bar_markup(label: &str, bar: &Bar) -> String {
    format!(
        "<div class='agg-row'><span>{label}</span><div class='bar'><div class='bar-low' style='width:{:.0}%; background:#f2f2f2'></div><div class='bar-high' style='width:{:.0}%'></div></div></div>",
        bar.low, bar.high
    )
}

fn page_head(title: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset='utf-8'><title>{}</title><link rel='stylesheet' href='/static/style.css'></head><body>",
        escape(title)
    )
}

fn signin_body(error: Option<&str>) -> String {
    form_page(include_str!("../public/html/signin.html"), error)
}

fn signup_body(error: Option<&str>) -> String {
    form_page(include_str!("../public/html/signup.html"), error)
}

fn form_page(base: &str, error: Option<&str>) -> String {
    match error {
        Some(msg) => format!("{base}<p class='error-text'>{}</p>", escape(msg)),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::{Cookie, Key};
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use sqlx::SqlitePool;

    async fn test_state() -> AppState {
        AppState {
            db: db::connect("sqlite::memory:").await.unwrap(),
        }
    }

    async fn seed_user(pool: &SqlitePool, email: &str, password: &str) {
        let user = NewUser {
            email: email.to_string(),
            name: "ada".to_string(),
            password_hash: generate_hash(password),
            gender: "f".to_string(),
            height: "170".to_string(),
            top: "M".to_string(),
            bottom: "M".to_string(),
            bust: "90".to_string(),
            shoe_size: "39".to_string(),
        };
        db::insert_user(pool, &user).await.unwrap();
    }

    macro_rules! test_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .service(index)
                    .service(main_view)
                    .service(item)
                    .service(add_review)
                    .service(signin_page)
                    .service(signin)
                    .service(signup_page)
                    .service(signup)
                    .wrap(
                        SessionMiddleware::builder(
                            CookieSessionStore::default(),
                            Key::from(&[7u8; 64]),
                        )
                        .cookie_secure(false)
                        .build(),
                    ),
            )
            .await
        };
    }

    fn session_cookie<B>(
        resp: &ServiceResponse<B>,
        previous: Option<Cookie<'static>>,
    ) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|c| c.name() == "id")
            .map(|c| c.into_owned())
            .or(previous)
            .expect("no session cookie")
    }

    fn signup_form(email: &str) -> Vec<(&'static str, String)> {
        vec![
            ("email", email.to_string()),
            ("name", "ada".to_string()),
            ("password", "secret".to_string()),
            ("password2", "secret".to_string()),
            ("gender", "f".to_string()),
            ("height", "170".to_string()),
            ("top", "M".to_string()),
            ("bottom", "M".to_string()),
            ("bust", "90".to_string()),
            ("shoe_size", "39".to_string()),
        ]
    }

    fn review_form_data(text: &str, size: &str) -> Vec<(&'static str, String)> {
        vec![
            ("text", text.to_string()),
            ("size", size.to_string()),
            ("length", "2".to_string()),
            ("thickness", "3".to_string()),
            ("quality", "1".to_string()),
            ("recommend", "2".to_string()),
        ]
    }

    #[actix_web::test]
    async fn main_page_lists_seeded_items() {
        let state = test_state().await;
        let app = test_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Wool sweater"));
        assert!(body.contains("/item/1"));
    }

    #[actix_web::test]
    async fn missing_item_is_a_404() {
        let state = test_state().await;
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/item/999").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn signup_creates_user_with_verifiable_hash() {
        let state = test_state().await;
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signup")
                .set_form(signup_form("new@example.com"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let user = db::user_by_email(&state.db, "new@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(user.password_hash, "secret");
        assert!(verify_password("secret", &user.password_hash).is_ok());
    }

    #[actix_web::test]
    async fn duplicate_signup_reports_conflict_and_inserts_nothing() {
        let state = test_state().await;
        let app = test_app!(state);
        seed_user(&state.db, "dup@example.com", "secret").await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signup")
                .set_form(signup_form("dup@example.com"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Email already exists in the database."));

        let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM user")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[actix_web::test]
    async fn signup_rejects_invalid_email_first() {
        let state = test_state().await;
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signup")
                .set_form(signup_form("no-at-sign"))
                .to_request(),
        )
        .await;
        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("You have to enter a valid email address"));
    }

    #[actix_web::test]
    async fn wrong_password_establishes_no_session() {
        let state = test_state().await;
        let app = test_app!(state);
        seed_user(&state.db, "ada@example.com", "secret").await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signin")
                .set_form([("email", "ada@example.com"), ("password", "wrong")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Password does not match!"));
    }

    #[actix_web::test]
    async fn unknown_email_is_reported_on_the_form() {
        let state = test_state().await;
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signin")
                .set_form([("email", "ghost@example.com"), ("password", "x")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("User does not exist!"));
    }

    #[actix_web::test]
    async fn review_without_session_is_unauthorized() {
        let state = test_state().await;
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/add_review")
                .set_form(review_form_data("nice", "1"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(db::review_count(&state.db).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn full_review_flow_inserts_and_redirects() {
        let state = test_state().await;
        let app = test_app!(state);
        seed_user(&state.db, "ada@example.com", "secret").await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signin")
                .set_form([("email", "ada@example.com"), ("password", "secret")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&resp, None);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/item/1")
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp, Some(cookie));

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/add_review")
                .cookie(cookie.clone())
                .set_form(review_form_data("fits well", "1"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers().get(header::LOCATION).unwrap();
        assert_eq!(location.to_str().unwrap(), "/item/1");
        assert_eq!(db::review_count(&state.db).await.unwrap(), 1);

        // The item page now shows the review with its labels.
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/item/1")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("fits well"));
        assert!(body.contains("Feels tight"));
        assert!(body.contains("Highly recommend"));
    }

    #[actix_web::test]
    async fn empty_review_text_redirects_without_insert() {
        let state = test_state().await;
        let app = test_app!(state);
        seed_user(&state.db, "ada@example.com", "secret").await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signin")
                .set_form([("email", "ada@example.com"), ("password", "secret")])
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&resp, None);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/item/2")
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&resp, Some(cookie));

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/add_review")
                .cookie(cookie)
                .set_form(review_form_data("", "1"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers().get(header::LOCATION).unwrap();
        assert_eq!(location.to_str().unwrap(), "/item/2");
        assert_eq!(db::review_count(&state.db).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn out_of_range_rating_is_rejected() {
        let state = test_state().await;
        let app = test_app!(state);
        seed_user(&state.db, "ada@example.com", "secret").await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/signin")
                .set_form([("email", "ada@example.com"), ("password", "secret")])
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&resp, None);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/item/1")
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&resp, Some(cookie));

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/add_review")
                .cookie(cookie)
                .set_form(review_form_data("way off", "5"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(db::review_count(&state.db).await.unwrap(), 0);
    }

    #[std::prelude::v1::test]
    fn parse_rating_enforces_bounds() {
        assert_eq!(parse_rating(&Some("2".into()), "size", 1, 3).unwrap(), 2);
        assert!(parse_rating(&Some("0".into()), "size", 1, 3).is_err());
        assert!(parse_rating(&Some("4".into()), "size", 1, 3).is_err());
        assert!(parse_rating(&Some("3".into()), "recommend", 1, 2).is_err());
        assert!(parse_rating(&Some("abc".into()), "size", 1, 3).is_err());
        assert!(parse_rating(&None, "size", 1, 3).is_err());
    }
}
