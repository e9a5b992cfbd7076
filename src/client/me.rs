use super::http::HttpClient;
use super::pagination::{paginate, PaginationOptions};
use super::params::QueryParams;
use super::types::FollowedProject;
use crate::error::Result;

/// The authenticated user, from `/api/private/me`.
#[derive(Clone)]
pub struct MeApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl MeApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    pub async fn get_followed_projects(
        &self,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<FollowedProject>> {
        let params = QueryParams::new();
        let params = &params;

        paginate(options.unwrap_or(&self.pagination), move |token| {
            self.http
                .get_page("/me/followed-projects", params, token, "followed projects")
        })
        .await
    }
}
