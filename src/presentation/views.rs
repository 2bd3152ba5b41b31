use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::{ErrorReport, HttpError};
use crate::cache::Rendered;
use crate::domain::blog::BlogPost;
use crate::infra::upstream::UpstreamError;

const SITE_TITLE: &str = "Blog";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

#[derive(Template)]
#[template(path = "layout.html")]
pub struct LayoutTemplate<'a> {
    pub title: &'a str,
    pub content: &'a str,
}

#[derive(Template)]
#[template(path = "blog/index.html")]
pub struct BlogIndexTemplate<'a> {
    pub posts: &'a [BlogPost],
}

#[derive(Template)]
#[template(path = "blog/post.html")]
pub struct BlogPostTemplate<'a> {
    pub post: &'a BlogPost,
    pub body: &'a str,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate<'a> {
    pub path: &'a str,
}

/// Render a cacheable content fragment.
fn render_fragment<T: Template>(
    template_name: &'static str,
    template: T,
) -> Result<Rendered, UpstreamError> {
    template
        .render()
        .map(Rendered::html)
        .map_err(|err| UpstreamError::Render {
            template: template_name,
            detail: err.to_string(),
        })
}

pub fn render_blog_index(posts: Vec<BlogPost>) -> Result<Rendered, UpstreamError> {
    render_fragment("blog/index.html", BlogIndexTemplate { posts: &posts })
}

pub fn render_blog_post(post: BlogPost) -> Result<Rendered, UpstreamError> {
    let body = post.content.as_deref().unwrap_or_default();
    render_fragment("blog/post.html", BlogPostTemplate { post: &post, body })
}

/// Wrap a cached content fragment in the page shell.
pub fn wrap_in_shell(title: &str, content: &Rendered) -> Result<Rendered, HttpError> {
    let title = if title.is_empty() {
        SITE_TITLE.to_string()
    } else {
        format!("{title} · {SITE_TITLE}")
    };

    LayoutTemplate {
        title: &title,
        content: content.body(),
    }
    .render()
    .map(Rendered::html)
    .map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::wrap_in_shell",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_not_found_response(path: &str, detail: &str) -> Response {
    let fragment = match (NotFoundTemplate { path }).render() {
        Ok(fragment) => Rendered::html(fragment),
        Err(err) => {
            return HttpError::from(TemplateRenderError::new(
                "presentation::views::render_not_found_response",
                "Template rendering failed",
                err,
            ))
            .into_response();
        }
    };

    let mut response = match wrap_in_shell("Not found", &fragment) {
        Ok(page) => (StatusCode::NOT_FOUND, Html(page.body().to_owned())).into_response(),
        Err(err) => return err.into_response(),
    };
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        detail.to_string(),
    )
    .attach(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> BlogPost {
        BlogPost {
            name: "rust".into(),
            category: "tech".into(),
            title: "Rust & friends".into(),
            description: "Notes".into(),
            created_at: "2024-03-01T00:00:00Z".into(),
            tags: vec!["lang".into()],
            content: Some("<p>hello</p>".into()),
        }
    }

    #[test]
    fn index_lists_posts_with_links() {
        let rendered = render_blog_index(vec![post()]).expect("renders");
        assert!(rendered.body().contains(r#"href="/blog/tech/rust""#));
        assert!(rendered.body().contains("Rust &amp; friends") || rendered.body().contains("Rust &#38; friends"));
    }

    #[test]
    fn post_body_is_not_escaped() {
        let rendered = render_blog_post(post()).expect("renders");
        assert!(rendered.body().contains("<p>hello</p>"));
    }

    #[test]
    fn shell_wraps_fragment() {
        let page = wrap_in_shell("Rust", &Rendered::html("<article>x</article>")).expect("renders");
        assert!(page.body().contains("<article>x</article>"));
        assert!(page.body().contains("<title>Rust · Blog</title>"));
        assert!(page.body().contains("<html"));
    }

    #[test]
    fn not_found_page_has_status_and_report() {
        let response = render_not_found_response("/blog/x/y", "post missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
