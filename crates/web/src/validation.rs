//! Form input validation.
//!
//! Each validator collects every problem instead of stopping at the first,
//! so a form can show all messages at once.

use serde::Deserialize;

use storedir_core::{Email, GeoPoint, Rating};

use crate::models::{NewReview, StoreDraft, StoreLocation};

pub const NAME_REQUIRED: &str = "You must supply a name!";
pub const EMAIL_INVALID: &str = "That Email is not valid!";
pub const PASSWORD_BLANK: &str = "Password Cannot be Blank!";
pub const CONFIRM_BLANK: &str = "Confirmed Password cannot be blank!";
pub const PASSWORDS_DIFFER: &str = "Oops! Your passwords do not match";
pub const STORE_NAME_REQUIRED: &str = "Please enter a store name!";
pub const ADDRESS_REQUIRED: &str = "You must supply an address!";
pub const COORDINATES_REQUIRED: &str = "You must supply coordinates!";
pub const COORDINATES_INVALID: &str = "Those coordinates are not on Earth!";
pub const REVIEW_TEXT_REQUIRED: &str = "Your review must have text!";
pub const RATING_INVALID: &str = "Please choose a rating between 1 and 5!";

/// Registration form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

/// A registration that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub name: String,
    pub email: Email,
}

fn check_name(name: &str, errors: &mut Vec<String>) -> String {
    let name = name.trim();
    if name.is_empty() {
        errors.push(NAME_REQUIRED.to_owned());
    }
    name.to_owned()
}

fn check_email(email: &str, errors: &mut Vec<String>) -> Option<Email> {
    Email::normalize(email)
        .map_err(|_| errors.push(EMAIL_INVALID.to_owned()))
        .ok()
}

/// Validate a registration, normalizing the email.
///
/// # Errors
///
/// Returns every validation message when any check fails.
pub fn validate_register(form: &RegisterForm) -> Result<ValidRegistration, Vec<String>> {
    let mut errors = Vec::new();

    let name = check_name(&form.name, &mut errors);
    let email = check_email(&form.email, &mut errors);

    if form.password.is_empty() {
        errors.push(PASSWORD_BLANK.to_owned());
    }
    if form.password_confirm.is_empty() {
        errors.push(CONFIRM_BLANK.to_owned());
    }
    if form.password != form.password_confirm {
        errors.push(PASSWORDS_DIFFER.to_owned());
    }

    match email {
        Some(email) if errors.is_empty() => Ok(ValidRegistration { name, email }),
        _ => Err(errors),
    }
}

/// Account form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Validate a profile update, normalizing the email.
///
/// # Errors
///
/// Returns every validation message when any check fails.
pub fn validate_account(form: &AccountForm) -> Result<(String, Email), Vec<String>> {
    let mut errors = Vec::new();
    let name = check_name(&form.name, &mut errors);
    let email = check_email(&form.email, &mut errors);

    match email {
        Some(email) if errors.is_empty() => Ok((name, email)),
        _ => Err(errors),
    }
}

/// New password form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

impl PasswordForm {
    /// Whether both fields hold the same password.
    #[must_use]
    pub fn passwords_match(&self) -> bool {
        self.password == self.password_confirm
    }
}

/// Text fields of the store form, as collected from the multipart body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFields {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub address: String,
    pub lng: String,
    pub lat: String,
}

/// Validate the store form, producing a draft carrying `photo`.
///
/// Name, description and address are trimmed; tags are trimmed and
/// deduplicated in submission order.
///
/// # Errors
///
/// Returns every validation message when any check fails.
pub fn validate_store(
    fields: &StoreFields,
    photo: Option<String>,
) -> Result<StoreDraft, Vec<String>> {
    let mut errors = Vec::new();

    let name = fields.name.trim();
    if name.is_empty() {
        errors.push(STORE_NAME_REQUIRED.to_owned());
    }

    let address = fields.address.trim();
    if address.is_empty() {
        errors.push(ADDRESS_REQUIRED.to_owned());
    }

    let point = match (
        fields.lng.trim().parse::<f64>(),
        fields.lat.trim().parse::<f64>(),
    ) {
        (Ok(lng), Ok(lat)) => GeoPoint::new(lng, lat)
            .map_err(|_| errors.push(COORDINATES_INVALID.to_owned()))
            .ok(),
        _ => {
            errors.push(COORDINATES_REQUIRED.to_owned());
            None
        }
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in fields.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_owned());
        }
    }

    match point {
        Some(point) if errors.is_empty() => Ok(StoreDraft {
            name: name.to_owned(),
            description: fields.description.trim().to_owned(),
            location: StoreLocation {
                point,
                address: address.to_owned(),
            },
            tags,
            photo,
        }),
        _ => Err(errors),
    }
}

/// Review form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rating: String,
}

/// Validate a review.
///
/// # Errors
///
/// Returns every validation message when any check fails.
pub fn validate_review(form: &ReviewForm) -> Result<NewReview, Vec<String>> {
    let mut errors = Vec::new();

    let text = form.text.trim();
    if text.is_empty() {
        errors.push(REVIEW_TEXT_REQUIRED.to_owned());
    }

    let rating = form
        .rating
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|stars| Rating::new(stars).ok());
    if rating.is_none() {
        errors.push(RATING_INVALID.to_owned());
    }

    match rating {
        Some(rating) if errors.is_empty() => Ok(NewReview {
            text: text.to_owned(),
            rating,
        }),
        _ => Err(errors),
    }
}
