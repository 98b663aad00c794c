//! HTML pages of the interactive authorization flow

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Failed to register template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
    #[error("Failed to render page: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Data shown on the sign-in form
#[derive(Debug, Serialize)]
pub struct LoginPage<'a> {
    pub session: &'a str,
    pub client_name: &'a str,
    pub email: &'a str,
    pub error: Option<&'a str>,
}

/// Data shown on the consent page
#[derive(Debug, Serialize)]
pub struct ConsentPage<'a> {
    pub session: &'a str,
    pub client_name: &'a str,
    pub user: &'a str,
    pub scope: &'a str,
}

/// "Render a login/consent view"
pub trait LoginView: Send + Sync {
    fn login(&self, page: &LoginPage<'_>) -> Result<String, ViewError>;
    fn consent(&self, page: &ConsentPage<'_>) -> Result<String, ViewError>;
    fn message(&self, heading: &str, message: &str) -> Result<String, ViewError>;
}

/// Pages rendered from the bundled Handlebars templates. Values are HTML-escaped.
pub struct HandlebarsLoginView {
    handlebars: Handlebars<'static>,
}

impl HandlebarsLoginView {
    pub fn new() -> Result<Self, ViewError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        let templates = [
            ("layout", include_str!("../../templates/layout.hbs")),
            ("login", include_str!("../../templates/login.hbs")),
            ("consent", include_str!("../../templates/consent.hbs")),
            ("message", include_str!("../../templates/message.hbs")),
        ];
        for (name, source) in templates {
            handlebars
                .register_template_string(name, source)
                .map_err(Box::new)?;
        }

        Ok(Self { handlebars })
    }
}

impl LoginView for HandlebarsLoginView {
    fn login(&self, page: &LoginPage<'_>) -> Result<String, ViewError> {
        Ok(self.handlebars.render("login", page)?)
    }

    fn consent(&self, page: &ConsentPage<'_>) -> Result<String, ViewError> {
        Ok(self.handlebars.render("consent", page)?)
    }

    fn message(&self, heading: &str, message: &str) -> Result<String, ViewError> {
        Ok(self
            .handlebars
            .render("message", &json!({ "heading": heading, "message": message }))?)
    }
}
