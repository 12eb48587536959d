//! The signed-in user's account profile on the core API.

use anyhow::Result;
use log::debug;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::{AuthenticatedClient, RequestOptions, read_data, read_success};

pub const ACCOUNT_PATH: &str = "/api/v1/account";
const PROFILE_IMAGE_PATH: &str = "/api/v1/account/profile-image";
const PROFILE_IMAGE_FIELD: &str = "profile_image";

/// Profile as stored by the server. Everything but `id` may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    pub email: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,

    pub full_name: Option<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub bio: Option<String>,

    pub profile_image_url: Option<String>,
    pub profile_image_filename: Option<String>,

    pub website_url: Option<String>,
    pub google_scholar_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub facebook_url: Option<String>,
    pub orcid_id: Option<String>,

    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state_province_region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,

    pub language_preference: Option<String>,
    pub timezone: Option<String>,
}

/// Fields to change. Unset fields are not sent and stay as they are.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_scholar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_province_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self == &AccountUpdate::default()
    }
}

/// What the server holds after a change, with its message if it sent one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountChange<T> {
    pub data: T,
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct UploadedImage {
    profile_image_url: String,
}

pub struct AccountApi {
    client: Arc<AuthenticatedClient>,
    api_url: String,
}

impl AccountApi {
    pub fn new(client: Arc<AuthenticatedClient>, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self) -> Result<UserAccount> {
        let response = self.client.get(&self.url(ACCOUNT_PATH)).await?;
        read_data(response, "Failed to fetch account").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, update: &AccountUpdate) -> Result<AccountChange<UserAccount>> {
        let response = self.client.put_json(&self.url(ACCOUNT_PATH), update).await?;
        let envelope = read_success(response, "Failed to update account").await?;
        Ok(AccountChange {
            data: envelope.data()?,
            message: envelope.message,
        })
    }

    /// Uploads a new profile image and returns where the server put it.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_profile_image(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<AccountChange<String>> {
        let options = RequestOptions::file(Method::POST, PROFILE_IMAGE_FIELD, file_name, bytes);
        let response = self
            .client
            .request(&self.url(PROFILE_IMAGE_PATH), options)
            .await?;
        let envelope = read_success(response, "Failed to upload profile image").await?;
        let uploaded: UploadedImage = envelope.data()?;
        debug!("Profile image stored at {}", uploaded.profile_image_url);
        Ok(AccountChange {
            data: uploaded.profile_image_url,
            message: envelope.message,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_profile_image(&self) -> Result<Option<String>> {
        let response = self.client.delete(&self.url(PROFILE_IMAGE_PATH)).await?;
        let envelope = read_success(response, "Failed to delete profile image").await?;
        Ok(envelope.message)
    }
}
