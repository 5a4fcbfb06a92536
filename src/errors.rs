#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Group not found")]
    GroupNotFound,

    #[error("Not a member of this group")]
    NotAMember,

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Invalid invite code")]
    InvalidInviteCode,

    #[error("The group creator cannot be removed")]
    CannotRemoveCreator,

    #[error("Group is at its member limit")]
    GroupFull,

    #[error("Post not found")]
    PostNotFound,
}

pub type GroupResult<T> = Result<T, GroupError>;
