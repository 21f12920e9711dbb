//! Identity store operations: signup, profile changes, account removal and sign-in.

use uuid::Uuid;

use crate::{
    auth,
    error::{AppError, AppResult},
    mailer::Mailer,
    models::{
        NewUser, Page, PageRequest, RegisterUserRequest, Role, UpdateUserRequest, User,
        UserChanges, UserProfile,
    },
    repository::Repository,
    validation::{FieldErrors, check_email, check_text, is_blank, normalize_email},
};

pub const NAME_MIN: usize = 3;
pub const NAME_MAX: usize = 50;

/// A freshly created pending account and the token mailed to it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub activation_token: String,
}

/// Checks the fields shared by signup and profile edits, including email uniqueness
/// (ignoring `except`). Password rules are left to the caller.
async fn check_account_fields(
    repo: &dyn Repository,
    errors: &mut FieldErrors,
    name: &str,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    check_text(errors, "name", "Name", name, Some(NAME_MIN), NAME_MAX);

    let before = errors.len();
    check_email(errors, "email", "Email", email);
    if errors.len() == before && repo.email_taken(&normalize_email(email), except).await? {
        errors.taken("email", "Email");
    }
    Ok(())
}

fn check_password_pair(errors: &mut FieldErrors, password: &str, confirmation: &str) {
    if is_blank(password) {
        errors.blank("password", "Password");
    }
    if is_blank(confirmation) {
        errors.blank("password_confirmation", "Confirm password");
    }
    if !is_blank(password) && !is_blank(confirmation) && password != confirmation {
        errors.add(
            "password_confirmation",
            "confirmation",
            "Confirm password doesn't match Password",
        );
    }
}

/// register
///
/// Creates a pending account and dispatches its activation message. Every violated rule
/// is reported together.
pub async fn register(
    repo: &dyn Repository,
    mailer: &dyn Mailer,
    form: RegisterUserRequest,
) -> AppResult<Registration> {
    let mut errors = FieldErrors::new();
    check_account_fields(repo, &mut errors, &form.name, &form.email, None).await?;
    check_password_pair(&mut errors, &form.password, &form.password_confirmation);
    errors.into_result()?;

    let activation_token = auth::generate_activation_token();
    let user = repo
        .insert_user(NewUser {
            name: form.name.trim().to_string(),
            email: normalize_email(&form.email),
            password_hash: auth::hash_password(&form.password)?,
            role: Role::Regular,
            activation_token: activation_token.clone(),
        })
        .await?;

    tracing::info!(user_id = %user.id, "account registered, awaiting activation");
    mailer.send_activation(&user.email, &activation_token).await;

    Ok(Registration {
        user,
        activation_token,
    })
}

/// update
///
/// Applies a profile edit. Blank password fields keep the current credential; filling
/// either one requires both to be present and equal.
pub async fn update(
    repo: &dyn Repository,
    user_id: Uuid,
    form: UpdateUserRequest,
) -> AppResult<User> {
    if repo.get_user(user_id).await?.is_none() {
        return Err(AppError::not_found("User", user_id));
    }

    let mut errors = FieldErrors::new();
    check_account_fields(repo, &mut errors, &form.name, &form.email, Some(user_id)).await?;
    let changes_password = !is_blank(&form.password) || !is_blank(&form.password_confirmation);
    if changes_password {
        check_password_pair(&mut errors, &form.password, &form.password_confirmation);
    }
    errors.into_result()?;

    let password_hash = if changes_password {
        Some(auth::hash_password(&form.password)?)
    } else {
        None
    };

    let user = repo
        .update_user(
            user_id,
            UserChanges {
                name: form.name.trim().to_string(),
                email: normalize_email(&form.email),
                password_hash,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("User", user_id))?;

    tracing::info!(user_id = %user.id, password_changed = changes_password, "profile updated");
    Ok(user)
}

/// delete
///
/// Removes the account. Its comments stay in their threads, shown as written by "Guest".
pub async fn delete(repo: &dyn Repository, user_id: Uuid) -> AppResult<User> {
    let user = repo
        .delete_user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", user_id))?;
    tracing::info!(user_id = %user.id, "account deleted, comments anonymized");
    Ok(user)
}

/// authenticate
///
/// Sign-in check. Unknown email and wrong password are indistinguishable to the caller.
pub async fn authenticate(repo: &dyn Repository, email: &str, password: &str) -> AppResult<User> {
    let user = repo
        .find_user_by_email(&normalize_email(email))
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !auth::verify_password(password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }
    if !user.is_active() {
        return Err(AppError::PendingActivation);
    }
    Ok(user)
}

pub async fn get_profile(repo: &dyn Repository, user_id: Uuid) -> AppResult<UserProfile> {
    repo.get_user(user_id)
        .await?
        .map(|u| UserProfile::from(&u))
        .ok_or_else(|| AppError::not_found("User", user_id))
}

pub async fn list_users(repo: &dyn Repository, page: PageRequest) -> AppResult<Page<UserProfile>> {
    let users = repo.list_users(page).await?;
    let total = repo.count_users().await?;
    Ok(Page::new(users, page, total).map(|u| UserProfile::from(&u)))
}
