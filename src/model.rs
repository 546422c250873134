use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub gender: String,
    pub height: String,
    pub top: String,
    pub bottom: String,
    pub bust: String,
    pub shoe_size: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Item {
    pub item_id: i64,
    pub item_name: String,
    pub item_picture_url: String,
}

pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub gender: String,
    pub height: String,
    pub top: String,
    pub bottom: String,
    pub bust: String,
    pub shoe_size: String,
}

pub struct NewReview {
    pub item_id: i64,
    pub user_id: i64,
    pub date: i64,
    pub text: String,
    pub size: i64,
    pub length: i64,
    pub thickness: i64,
    pub quality: i64,
    pub recommend: i64,
}

/// One review row joined with its author's display name, ratings still raw.
#[derive(Debug, sqlx::FromRow)]
pub struct ReviewRow {
    pub text: String,
    pub user_name: String,
    pub size: i64,
    pub length: i64,
    pub thickness: i64,
    pub quality: i64,
    pub recommend: i64,
}

/// A review ready for rendering, ordinals replaced by their labels.
#[derive(Debug)]
pub struct ReviewDisplay {
    pub text: String,
    pub user_name: String,
    pub size: &'static str,
    pub length: &'static str,
    pub thickness: &'static str,
    pub quality: &'static str,
    pub recommend: &'static str,
}

impl ReviewRow {
    pub fn into_display(self) -> ReviewDisplay {
        ReviewDisplay {
            size: size_label(self.size),
            length: length_label(self.length),
            thickness: thickness_label(self.thickness),
            quality: quality_label(self.quality),
            recommend: recommend_label(self.recommend),
            text: self.text,
            user_name: self.user_name,
        }
    }
}

// Fixed ordinal-to-text mappings. Stored values outside the 1..=3 (1..=2 for
// recommend) domain render as "-" rather than failing the whole page.
pub fn size_label(v: i64) -> &'static str {
    match v {
        1 => "Feels tight",
        2 => "Perfect",
        3 => "Fits wide",
        _ => "-",
    }
}

pub fn length_label(v: i64) -> &'static str {
    match v {
        1 => "Short",
        2 => "Right",
        3 => "Long",
        _ => "-",
    }
}

pub fn thickness_label(v: i64) -> &'static str {
    match v {
        1 => "Thin",
        2 => "Medium",
        3 => "Thick",
        _ => "-",
    }
}

pub fn quality_label(v: i64) -> &'static str {
    match v {
        1 => "Cheap quality",
        2 => "Ok",
        3 => "High quality",
        _ => "-",
    }
}

pub fn recommend_label(v: i64) -> &'static str {
    match v {
        1 => "Do not recommend",
        2 => "Highly recommend",
        _ => "-",
    }
}

/// Per-attribute review averages scaled to 0-100. `None` means no reviews.
#[derive(Debug, sqlx::FromRow)]
pub struct RatingAverages {
    pub size: Option<f64>,
    pub length: Option<f64>,
    pub thickness: Option<f64>,
    pub quality: Option<f64>,
    pub recommend: Option<f64>,
}

/// Low/high percentage pair for one rating bar. Presentation (widths,
/// colors) belongs to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub low: f64,
    pub high: f64,
}

impl Bar {
    /// An item with no reviews gets a zeroed average rather than NULL
    /// propagation from the store.
    pub fn from_average(avg: Option<f64>) -> Bar {
        let avg = avg.unwrap_or(0.0);
        Bar {
            low: (avg - 2.0).clamp(0.0, 100.0),
            high: (avg + 2.0).clamp(0.0, 100.0),
        }
    }
}

#[derive(Debug)]
pub struct RatingBars {
    pub size: Bar,
    pub length: Bar,
    pub thickness: Bar,
    pub quality: Bar,
    pub recommend: Bar,
}

impl RatingAverages {
    pub fn bars(&self) -> RatingBars {
        RatingBars {
            size: Bar::from_average(self.size),
            length: Bar::from_average(self.length),
            thickness: Bar::from_average(self.thickness),
            quality: Bar::from_average(self.quality),
            recommend: Bar::from_average(self.recommend),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignupForm {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
    pub gender: Option<String>,
    pub height: Option<String>,
    pub top: Option<String>,
    pub bottom: Option<String>,
    pub bust: Option<String>,
    pub shoe_size: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SigninForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewForm {
    pub text: Option<String>,
    pub size: Option<String>,
    pub length: Option<String>,
    pub thickness: Option<String>,
    pub quality: Option<String>,
    pub recommend: Option<String>,
}
