use anyhow::{Result, bail};
use std::path::Path;

use crate::account::{AccountUpdate, UserAccount};
use crate::runtime::Runtime;

use super::services::Services;

fn print_account(account: &UserAccount) {
    println!("{}", account.email.as_deref().unwrap_or(&account.id));
    let rows = [
        ("id", Some(account.id.as_str())),
        ("name", account.full_name.as_deref()),
        ("institution", account.institution.as_deref()),
        ("department", account.department.as_deref()),
        ("position", account.position.as_deref()),
        ("orcid", account.orcid_id.as_deref()),
        ("scholar", account.google_scholar_url.as_deref()),
        ("website", account.website_url.as_deref()),
        ("github", account.github_url.as_deref()),
        ("linkedin", account.linkedin_url.as_deref()),
        ("city", account.city.as_deref()),
        ("country", account.country.as_deref()),
        ("timezone", account.timezone.as_deref()),
        ("image", account.profile_image_url.as_deref()),
    ];
    for (label, value) in rows {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            println!("  {:<12} {}", format!("{}:", label), value);
        }
    }
    if let Some(bio) = account.bio.as_deref().filter(|b| !b.is_empty()) {
        println!();
        println!("{}", bio);
    }
}

#[tracing::instrument(skip(services))]
pub async fn show_account(services: &Services) -> Result<()> {
    let account = services.account.get().await?;
    print_account(&account);
    Ok(())
}

#[tracing::instrument(skip(services))]
pub async fn update_account(services: &Services, update: &AccountUpdate) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one field, e.g. --institution.");
    }
    let change = services.account.update(update).await?;
    println!(
        "{}",
        change.message.as_deref().unwrap_or("Account updated.")
    );
    print_account(&change.data);
    Ok(())
}

#[tracing::instrument(skip(services, runtime))]
pub async fn upload_profile_image<R: Runtime>(
    services: &Services,
    runtime: &R,
    path: &Path,
) -> Result<()> {
    let bytes = runtime.read(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("profile-image");
    let change = services
        .account
        .upload_profile_image(file_name, bytes)
        .await?;
    println!(
        "{}",
        change.message.as_deref().unwrap_or("Profile image uploaded.")
    );
    println!("{}", change.data);
    Ok(())
}

#[tracing::instrument(skip(services))]
pub async fn delete_profile_image(services: &Services) -> Result<()> {
    let message = services.account.delete_profile_image().await?;
    println!("{}", message.as_deref().unwrap_or("Profile image deleted."));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::config::{Config, Environment};
    use crate::runtime::MockRuntime;
    use crate::session::{MemorySession, UserIdentity};
    use mockito::{Matcher, Server};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn services(api_url: &str) -> Services {
        let session = Arc::new(MemorySession::signed_in(
            "tok",
            UserIdentity {
                id: "u-42".to_string(),
                email: "ada@example.com".to_string(),
                roles: vec![],
            },
        ));
        let config = Config {
            environment: Environment::Dev,
            api_url: api_url.to_string(),
            ai_api_url: api_url.to_string(),
            session_file: PathBuf::from("/unused"),
            poll_interval: Duration::from_millis(1),
        };
        Services::with_session(session, &config).unwrap()
    }

    #[tokio::test]
    async fn test_empty_update_sends_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v1/account")
            .expect(0)
            .create_async()
            .await;

        let err = update_account(&services(&server.url()), &AccountUpdate::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().starts_with("Nothing to update"));
    }

    #[tokio::test]
    async fn test_upload_reads_file_through_runtime() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/account/profile-image")
            .match_body(Matcher::Regex(r#"filename="portrait.jpg""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"profile_image_url": "https://cdn/u-42.jpg"}}"#)
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .withf(|path| path == Path::new("/home/ada/portrait.jpg"))
            .times(1)
            .returning(|_| Ok(b"JPEGDATA".to_vec()));

        upload_profile_image(
            &services(&server.url()),
            &runtime,
            Path::new("/home/ada/portrait.jpg"),
        )
        .await
        .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_missing_file_sends_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/account/profile-image")
            .expect(0)
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read()
            .returning(|_| Err(anyhow::anyhow!("Failed to read /missing.png")));

        let err = upload_profile_image(&services(&server.url()), &runtime, Path::new("/missing.png"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("/missing.png"));
    }
}
