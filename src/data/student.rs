use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use time::Date;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub preferred_name: Option<String>,
    pub surname: String,
    pub email: String,
    #[serde(with = "iso_date")]
    pub date_of_birth: Date,
}

/// Every writable column of a student, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentFields {
    pub first_name: String,
    pub preferred_name: Option<String>,
    pub surname: String,
    pub email: String,
    pub date_of_birth: Date,
}

impl Student {
    pub fn from_fields(id: i64, fields: StudentFields) -> Self {
        let StudentFields {
            first_name,
            preferred_name,
            surname,
            email,
            date_of_birth,
        } = fields;

        Self {
            id,
            first_name,
            preferred_name,
            surname,
            email,
            date_of_birth,
        }
    }

    #[cfg(test)]
    pub fn fields(&self) -> StudentFields {
        StudentFields {
            first_name: self.first_name.clone(),
            preferred_name: self.preferred_name.clone(),
            surname: self.surname.clone(),
            email: self.email.clone(),
            date_of_birth: self.date_of_birth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentOrderField {
    Id,
    FirstName,
    Surname,
    Email,
    DateOfBirth,
}

impl StudentOrderField {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "first_name" => Self::FirstName,
            "surname" => Self::Surname,
            "email" => Self::Email,
            "date_of_birth" => Self::DateOfBirth,
            _ => return None,
        })
    }

    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FirstName => "first_name",
            Self::Surname => "surname",
            Self::Email => "email",
            Self::DateOfBirth => "date_of_birth",
        }
    }

    fn compare(self, a: &Student, b: &Student) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::FirstName => a.first_name.cmp(&b.first_name),
            Self::Surname => a.surname.cmp(&b.surname),
            Self::Email => a.email.cmp(&b.email),
            Self::DateOfBirth => a.date_of_birth.cmp(&b.date_of_birth),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub field: StudentOrderField,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentQuery {
    pub search: Option<String>,
    pub ordering: Vec<OrderKey>,
    pub window: Option<Window>,
}

impl StudentQuery {
    /// Parses a comma separated list like `surname,-date_of_birth`. Unknown fields are skipped, and
    /// only the first mention of a field counts.
    pub fn parse_ordering(raw: &str) -> Vec<OrderKey> {
        let mut keys: Vec<OrderKey> = Vec::new();

        for part in raw.split(',').map(str::trim) {
            let (name, descending) = match part.strip_prefix('-') {
                Some(name) => (name, true),
                None => (part, false),
            };
            let Some(field) = StudentOrderField::from_name(name) else {
                continue;
            };
            if keys.iter().any(|key| key.field == field) {
                continue;
            }
            keys.push(OrderKey { field, descending });
        }

        keys
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    pub fn matches(&self, student: &Student) -> bool {
        let Some(term) = self.search_term() else {
            return true;
        };
        let term = term.to_lowercase();

        [
            Some(student.first_name.as_str()),
            student.preferred_name.as_deref(),
            Some(student.surname.as_str()),
            Some(student.email.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(&term))
    }

    pub fn compare(&self, a: &Student, b: &Student) -> Ordering {
        self.ordering
            .iter()
            .map(|key| {
                let ordering = key.field.compare(a, b);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }
}
