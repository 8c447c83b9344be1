/// Form field validation used before any request is sent
use crate::error::{BazaarError, Result};
use crate::models::{Credentials, NewPost, ProfileUpdate, Registration};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// Letters and spaces, 3 to 15 of them somewhere in the input (unanchored)
static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z ]{3,15}").expect("name regex"));

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.([^\s@]{2,})+$").expect("email regex"));

static PASSWORD_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-zA-Z]{6,}$").expect("password regex"));

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[+]?[(]?[0-9]{3}[)]?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$").expect("phone regex")
});

pub fn is_valid_name(value: &str) -> bool {
    NAME.is_match(value)
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// At least six ASCII alphanumerics with a digit, a lowercase and an uppercase letter
pub fn is_valid_password(value: &str) -> bool {
    PASSWORD_CHARSET.is_match(value)
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| c.is_ascii_lowercase())
        && value.chars().any(|c| c.is_ascii_uppercase())
}

pub fn is_valid_phone(value: &str) -> bool {
    PHONE.is_match(value)
}

/// Per-field outcome; the caller shows failures inline and keeps the
/// submit action disabled until every field passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    pub invalid: Vec<&'static str>,
}

impl FieldErrors {
    fn check(&mut self, field: &'static str, ok: bool) {
        if !ok {
            self.invalid.push(field);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    pub fn is_field_valid(&self, field: &str) -> bool {
        !self.invalid.iter().any(|f| *f == field)
    }

    fn into_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(BazaarError::Validation(format!(
                "invalid fields: {}",
                self.invalid.join(", ")
            )))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignInForm {
    pub phone_number: String,
    pub password: String,
}

impl SignInForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        errors.check("phoneNumber", is_valid_phone(&self.phone_number));
        errors.check("password", is_valid_password(&self.password));
        errors
    }

    pub fn into_credentials(self) -> Result<Credentials> {
        self.validate().into_result()?;
        Ok(Credentials {
            phone_number: self.phone_number,
            password: self.password,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub phone_number: String,
    pub password: String,
    pub agreed: bool,
}

impl RegistrationForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        errors.check("phoneNumber", is_valid_phone(&self.phone_number));
        errors.check("password", is_valid_password(&self.password));
        errors.check("agreed", self.agreed);
        errors
    }

    pub fn into_registration(self) -> Result<Registration> {
        self.validate().into_result()?;
        Ok(Registration {
            phone_number: self.phone_number,
            password: self.password,
            agreed: self.agreed,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub phone_number: String,
    pub old_password: String,
    pub new_password: String,
    pub email: String,
}

impl ProfileForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        errors.check("phoneNumber", is_valid_phone(&self.phone_number));
        errors.check("email", is_valid_email(&self.email));
        errors.check("newPassword", is_valid_password(&self.new_password));
        errors
    }

    pub fn into_update(self) -> Result<ProfileUpdate> {
        self.validate().into_result()?;
        Ok(ProfileUpdate {
            phone_number: self.phone_number,
            old_password: self.old_password,
            new_password: self.new_password,
            email: self.email,
        })
    }
}

/// The "publish a request" form, quantity still as typed
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub name: String,
    pub brand: String,
    pub quantity: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
}

impl PostForm {
    fn parsed_quantity(&self) -> Option<u32> {
        self.quantity.trim().parse::<u32>().ok().filter(|q| *q > 0)
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        errors.check("prodName", !self.name.is_empty());
        errors.check("prodBrand", !self.brand.is_empty());
        errors.check("prodQty", self.parsed_quantity().is_some());
        errors.check("description", !self.description.is_empty());
        errors.check("category", !self.category.is_empty());
        errors
    }

    /// Add a tag, ignoring blanks and duplicates
    pub fn add_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn into_new_post(self, author_email: impl Into<String>) -> Result<NewPost> {
        let quantity = self.parsed_quantity();
        self.validate().into_result()?;
        Ok(NewPost {
            product_name: self.name,
            product_company: self.brand,
            product_quantity: quantity.unwrap_or_default(),
            product_description: self.description,
            category: self.category,
            tags: self.tags,
            product_image: self.image_url,
            author_email: author_email.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(!is_valid_email("a@b"));
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@b.c"));
    }

    #[test]
    fn test_password() {
        assert!(is_valid_password("Secret1"));
        assert!(!is_valid_password("secret1"));
        assert!(!is_valid_password("SECRET1"));
        assert!(!is_valid_password("Secret"));
        assert!(!is_valid_password("Sec1"));
        assert!(!is_valid_password("Secret 1"));
    }

    #[test]
    fn test_phone_formats() {
        for ok in [
            "(123) 456-7890",
            "(123)456-7890",
            "123-456-7890",
            "123.456.7890",
            "1234567890",
            "+31636363634",
            "075-63546725",
        ] {
            assert!(is_valid_phone(ok), "{} should be accepted", ok);
        }
        assert!(!is_valid_phone("12-34"));
        assert!(!is_valid_phone("phone"));
    }

    #[test]
    fn test_name_is_unanchored() {
        assert!(is_valid_name("Ann Lee"));
        assert!(is_valid_name("x1 Bob"));
        assert!(!is_valid_name("Al"));
    }

    #[test]
    fn test_registration_requires_agreement() {
        let form = RegistrationForm {
            phone_number: "1234567890".into(),
            password: "Secret1".into(),
            agreed: false,
        };
        let errors = form.validate();
        assert_eq!(errors.invalid, vec!["agreed"]);
        assert!(errors.is_field_valid("password"));
        assert!(form.into_registration().is_err());
    }

    #[test]
    fn test_post_form() {
        let mut form = PostForm {
            name: "Widget".into(),
            brand: "Acme".into(),
            quantity: "0".into(),
            description: "Blue one".into(),
            category: "Tools".into(),
            ..Default::default()
        };
        assert_eq!(form.validate().invalid, vec!["prodQty"]);

        form.quantity = "3".into();
        form.add_tag("blue");
        form.add_tag(" blue ");
        form.add_tag("");
        let post = form.into_new_post("a@b.co").unwrap();
        assert_eq!(post.product_quantity, 3);
        assert_eq!(post.tags, vec!["blue"]);
        assert_eq!(post.author_email, "a@b.co");
    }
}
