use crate::auth::password;
use crate::entities::*;
use crate::validation::{ValidationError, optional_text, required_text};
use chrono::{DateTime, Utc};
use sea_orm::*;

pub mod api;

const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_BIO_LEN: usize = 500;
const MIN_PASSWORD_LEN: usize = 8;

/// A registered marketplace user. The password hash never leaves the service.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            display_name: model.display_name,
            bio: model.bio,
            created_at: model.created_at,
        }
    }
}

/// Input for [`UserService::register`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Fields a user may change on their own profile. `None` leaves a field as is;
/// an empty bio clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("Email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct UserService<'a> {
    db: &'a DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &DatabaseConnection) -> UserService<'_> {
        UserService { db }
    }

    /// Registers a new user after validating the input and hashing the password.
    #[tracing::instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn register(&self, new_user: NewUser) -> Result<User, UserServiceError> {
        let username = validate_username(&new_user.username)?;
        let email = validate_email(&new_user.email)?;
        if new_user.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::new(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            )
            .into());
        }
        let display_name = match new_user.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                required_text("display_name", name, 1, MAX_DISPLAY_NAME_LEN)?
            }
            _ => username.clone(),
        };

        if self.find_by_username(&username).await?.is_some() {
            return Err(UserServiceError::DuplicateUsername(username));
        }
        let email_taken = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(self.db)
            .await?
            .is_some();
        if email_taken {
            return Err(UserServiceError::DuplicateEmail(email));
        }

        let password = new_user.password;
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&password))
                .await
                .map_err(|e| UserServiceError::PasswordHashing(e.to_string()))?
                .map_err(|e| UserServiceError::PasswordHashing(e.to_string()))?;

        let active_model = user::ActiveModel {
            username: ActiveValue::Set(username.clone()),
            email: ActiveValue::Set(email.clone()),
            password_hash: ActiveValue::Set(password_hash),
            display_name: ActiveValue::Set(display_name),
            bio: ActiveValue::Set(None),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created = match active_model.insert(self.db).await {
            Ok(created) => created,
            Err(err) => return Err(self.insert_error(err, &username, &email).await),
        };

        tracing::info!(user_id = created.id, "Registered new user");
        Ok(User::from(created))
    }

    /// Checks a username/password pair. Unknown users and wrong passwords are
    /// indistinguishable to the caller.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        let Some(model) = self.find_by_username(username.trim()).await? else {
            return Err(UserServiceError::InvalidCredentials);
        };

        let stored_hash = model.password_hash.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            password::verify_password(&password, &stored_hash)
        })
        .await
        .map_err(|e| UserServiceError::PasswordHashing(e.to_string()))?;

        if !matches {
            tracing::info!("Rejected login attempt");
            return Err(UserServiceError::InvalidCredentials);
        }
        Ok(User::from(model))
    }

    /// Retrieves a user by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i32) -> Result<User, UserServiceError> {
        user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .map(User::from)
            .ok_or(UserServiceError::UserNotFound(id))
    }

    /// Updates the display name and/or bio of a user.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        id: i32,
        update: ProfileUpdate,
    ) -> Result<User, UserServiceError> {
        let existing = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;

        let mut active_model: user::ActiveModel = existing.into();
        if let Some(display_name) = update.display_name.as_deref() {
            active_model.display_name = ActiveValue::Set(required_text(
                "display_name",
                display_name,
                1,
                MAX_DISPLAY_NAME_LEN,
            )?);
        }
        if let Some(bio) = update.bio.as_deref() {
            active_model.bio = ActiveValue::Set(optional_text("bio", Some(bio), MAX_BIO_LEN)?);
        }
        let updated = active_model.update(self.db).await?;
        Ok(User::from(updated))
    }

    /// Maps a failed insert to the duplicate it was caused by. A concurrent
    /// registration can take the username or the email between the checks in
    /// [`UserService::register`] and the insert.
    pub(crate) async fn insert_error(
        &self,
        err: DbErr,
        username: &str,
        email: &str,
    ) -> UserServiceError {
        if !matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            return UserServiceError::Database(err);
        }
        match self.find_by_username(username).await {
            Ok(Some(_)) => return UserServiceError::DuplicateUsername(username.to_string()),
            Ok(None) => {}
            Err(lookup) => return UserServiceError::Database(lookup),
        }
        let email_taken = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db)
            .await;
        match email_taken {
            Ok(Some(_)) => UserServiceError::DuplicateEmail(email.to_string()),
            Ok(None) => UserServiceError::Database(err),
            Err(lookup) => UserServiceError::Database(lookup),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db)
            .await
    }
}

fn validate_username(username: &str) -> Result<String, ValidationError> {
    let username = required_text("username", username, 3, 32)?;
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::new(
            "username",
            "may only contain letters, digits and underscores",
        ));
    }
    Ok(username)
}

fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = required_text("email", email, 3, 254)?.to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split('.')
                    .filter(|label| !label.is_empty())
                    .count()
                    >= 2
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(ValidationError::new("email", "is not a valid address"));
    }
    Ok(email)
}
