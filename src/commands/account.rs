use anyhow::{Result, bail};

use crate::auth::AuthOutcome;

use super::services::Services;

fn finish(outcome: AuthOutcome) -> Result<()> {
    match outcome {
        AuthOutcome::Success { user, message, .. } => {
            println!("{}", message);
            if let Some(user) = user {
                println!("Signed in as {} ({})", user.email, user.id);
            }
            Ok(())
        }
        AuthOutcome::Failure { message } => bail!(message),
    }
}

#[tracing::instrument(skip(services, password))]
pub async fn login(services: &Services, email: &str, password: &str) -> Result<()> {
    finish(services.auth.login(email, password).await)
}

#[tracing::instrument(skip(services, password))]
pub async fn register(services: &Services, email: &str, password: &str) -> Result<()> {
    finish(services.auth.register(email, password).await)?;
    println!("You can now run `scholarai login`.");
    Ok(())
}

#[tracing::instrument(skip(services))]
pub async fn logout(services: &Services) -> Result<()> {
    services.auth.logout().await?;
    println!("Logged out.");
    Ok(())
}

pub fn whoami(services: &Services) -> Result<()> {
    if !services.auth.is_authenticated() {
        bail!("Not logged in. Run `scholarai login` first.");
    }
    match services.auth.current_user() {
        Some(user) => {
            println!("{}", user.email);
            println!("  id:    {}", user.id);
            if !user.roles.is_empty() {
                println!("  roles: {}", user.roles.join(", "));
            }
        }
        None => println!("Logged in (no user details stored)"),
    }
    Ok(())
}

#[tracing::instrument(skip(services))]
pub async fn forgot_password(services: &Services, email: &str) -> Result<()> {
    services.auth.send_reset_code(email).await?;
    println!("A reset code has been sent to {}.", email);
    Ok(())
}

#[tracing::instrument(skip(services, code, new_password))]
pub async fn reset_password(
    services: &Services,
    email: &str,
    code: &str,
    new_password: &str,
) -> Result<()> {
    services
        .auth
        .submit_new_password(email, code, new_password)
        .await?;
    println!("Password updated. You can now log in with the new password.");
    Ok(())
}
