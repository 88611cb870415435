//! Turns JSON request bodies into [`StudentFields`], gathering every problem with the input into a
//! map of field name to messages so clients can show them next to the right field.

use crate::data::student::{Student, StudentFields};
use email_address::EmailAddress;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::{Date, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const MAX_NAME_LENGTH: usize = 50;
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_STRING: &str = "Not a valid string.";
const NOT_BLANK: &str = "This field may not be blank.";
const BAD_EMAIL: &str = "Enter a valid email address.";
const BAD_DATE: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";
const FUTURE_DATE: &str = "Date of birth cannot be in the future.";

fn too_long() -> String {
    format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters.")
}

/// Validates a body for a new student: every required field must be there.
pub fn validate_create(body: &Value) -> Result<StudentFields, FieldErrors> {
    Reader::new(body, None)?.finish()
}

/// Validates a body replacing an existing student. Like creation, every required field must be
/// present.
pub fn validate_update(body: &Value) -> Result<StudentFields, FieldErrors> {
    validate_create(body)
}

/// Validates a body patching `existing`: fields missing from the body keep their current values.
pub fn validate_partial(body: &Value, existing: &Student) -> Result<StudentFields, FieldErrors> {
    Reader::new(body, Some(existing))?.finish()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

struct Reader<'a> {
    body: &'a Map<String, Value>,
    existing: Option<&'a Student>,
    errors: FieldErrors,
}

impl<'a> Reader<'a> {
    fn new(body: &'a Value, existing: Option<&'a Student>) -> Result<Self, FieldErrors> {
        let Value::Object(body) = body else {
            let message = format!(
                "Invalid data. Expected a dictionary, but got {}.",
                json_kind(body)
            );
            return Err(FieldErrors::from([(
                NON_FIELD_ERRORS.to_string(),
                vec![message],
            )]));
        };

        Ok(Self {
            body,
            existing,
            errors: FieldErrors::new(),
        })
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// `Ok(None)` means the field was absent. Nulls are `Ok(Some(None))`.
    fn raw_string(&mut self, field: &str) -> Result<Option<Option<String>>, ()> {
        match self.body.get(field) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(Value::String(s)) => Ok(Some(Some(s.trim().to_string()))),
            Some(_) => {
                self.error(field, NOT_STRING);
                Err(())
            }
        }
    }

    fn checked_length(&mut self, field: &str, value: String) -> Option<String> {
        if value.chars().count() > MAX_NAME_LENGTH {
            self.error(field, too_long());
            None
        } else {
            Some(value)
        }
    }

    /// Reads a required string, falling back to `current` when the field is absent.
    fn required_string(&mut self, field: &str, current: Option<String>) -> Option<String> {
        match self.raw_string(field) {
            Err(()) => None,
            Ok(None) => {
                if current.is_none() {
                    self.error(field, REQUIRED);
                }
                current
            }
            Ok(Some(None)) => {
                self.error(field, NOT_NULL);
                None
            }
            Ok(Some(Some(value))) if value.is_empty() => {
                self.error(field, NOT_BLANK);
                None
            }
            Ok(Some(Some(value))) => Some(value),
        }
    }

    fn name(&mut self, field: &str, current: Option<String>) -> Option<String> {
        let value = self.required_string(field, current)?;
        self.checked_length(field, value)
    }

    /// `None` means invalid, `Some(None)` is a student with no preferred name.
    fn preferred_name(&mut self) -> Option<Option<String>> {
        const FIELD: &str = "preferred_name";

        match self.raw_string(FIELD) {
            Err(()) => None,
            Ok(None) => Some(self.existing.and_then(|s| s.preferred_name.clone())),
            Ok(Some(None)) => Some(None),
            Ok(Some(Some(value))) if value.is_empty() => Some(None),
            Ok(Some(Some(value))) => self.checked_length(FIELD, value).map(Some),
        }
    }

    fn email(&mut self) -> Option<String> {
        const FIELD: &str = "email";

        let current = self.existing.map(|s| s.email.clone());
        let value = self.required_string(FIELD, current)?;
        if EmailAddress::is_valid(&value) {
            Some(value)
        } else {
            self.error(FIELD, BAD_EMAIL);
            None
        }
    }

    fn date_of_birth(&mut self) -> Option<Date> {
        const FIELD: &str = "date_of_birth";

        let current = self.existing.map(|s| s.date_of_birth);
        let raw = match self.raw_string(FIELD) {
            Err(()) => return None,
            Ok(None) => {
                if current.is_none() {
                    self.error(FIELD, REQUIRED);
                }
                return current;
            }
            Ok(Some(None)) => {
                self.error(FIELD, NOT_NULL);
                return None;
            }
            Ok(Some(Some(raw))) => raw,
        };

        let Ok(date) = Date::parse(&raw, DATE_FORMAT) else {
            self.error(FIELD, BAD_DATE);
            return None;
        };
        if date > OffsetDateTime::now_utc().date() {
            self.error(FIELD, FUTURE_DATE);
            return None;
        }
        Some(date)
    }

    fn finish(mut self) -> Result<StudentFields, FieldErrors> {
        let existing = self.existing;

        let first_name = self.name("first_name", existing.map(|s| s.first_name.clone()));
        let preferred_name = self.preferred_name();
        let surname = self.name("surname", existing.map(|s| s.surname.clone()));
        let email = self.email();
        let date_of_birth = self.date_of_birth();

        match (first_name, preferred_name, surname, email, date_of_birth) {
            (
                Some(first_name),
                Some(preferred_name),
                Some(surname),
                Some(email),
                Some(date_of_birth),
            ) if self.errors.is_empty() => Ok(StudentFields {
                first_name,
                preferred_name,
                surname,
                email,
                date_of_birth,
            }),
            _ => Err(self.errors),
        }
    }
}
