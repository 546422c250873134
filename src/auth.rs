use actix_session::Session;
use sqlx::SqlitePool;

use crate::db;
use crate::error::Result;
use crate::model::{SignupForm, User};

pub const USER_ID_KEY: &str = "user_id";
pub const ITEM_ID_KEY: &str = "item_id";

/// Marks a session whose user row no longer exists. The session keeps the
/// sentinel until a fresh sign-in overwrites it.
const STALE_USER_ID: i64 = -1;

/// Resolves the signed-in user from the session cookie, if any. Every
/// handler that cares about identity calls this at its top; the result is
/// threaded through explicitly rather than stashed in a global.
pub async fn current_user(pool: &SqlitePool, session: &Session) -> Result<Option<User>> {
    let Some(user_id) = session.get::<i64>(USER_ID_KEY)? else {
        return Ok(None);
    };

    let user = db::user_by_id(pool, user_id).await?;
    if user.is_none() {
        log::debug!("session carries stale user_id {user_id}");
        session.insert(USER_ID_KEY, STALE_USER_ID)?;
    }
    Ok(user)
}

pub fn sign_in(session: &Session, user: &User) -> Result<()> {
    session.insert(USER_ID_KEY, user.user_id)?;
    log::info!("user {} signed in", user.user_id);
    Ok(())
}

/// Credential checks, in form order: email shape, both password fields
/// present, passwords equal. The duplicate-email lookup happens in the
/// handler between this and `validate_profile`; the first failing check
/// wins.
pub fn validate_credentials(form: &SignupForm) -> std::result::Result<(), &'static str> {
    let email = form.email.as_deref().unwrap_or("");
    if email.is_empty() || !email.contains('@') {
        return Err("You have to enter a valid email address");
    }

    let password = form.password.as_deref().unwrap_or("");
    let password2 = form.password2.as_deref().unwrap_or("");
    if password.is_empty() || password2.is_empty() {
        return Err("You have to enter a password");
    }
    if password != password2 {
        return Err("The two passwords do not match");
    }

    Ok(())
}

pub fn validate_profile(form: &SignupForm) -> std::result::Result<(), &'static str> {
    if blank(&form.gender) {
        return Err("You have to enter your gender.");
    }
    if blank(&form.height) {
        return Err("You have to enter your height.");
    }
    if blank(&form.top) {
        return Err("You have to enter your top size.");
    }
    if blank(&form.bottom) {
        return Err("You have to enter your bottom size.");
    }
    if blank(&form.bust) {
        return Err("You have to enter your bust size.");
    }
    if blank(&form.shoe_size) {
        return Err("You have to enter your shoe size.");
    }
    Ok(())
}

fn blank(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, str::is_empty)
}
