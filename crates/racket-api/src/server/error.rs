#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn new(
        status: StatusCode,
        error_code: ErrorCode,
        message: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            status,
            error: ApiError::new(error_code, message, details),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidRequest,
            message,
            details,
        )
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            message,
            details,
        )
    }

    fn from_persistence(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotAttached => {
                Self::invalid_query("persistence store is not attached", None)
            }
            other => Self::internal("persistence operation failed", Some(other.to_string())),
        }
    }

    /// Every engine failure maps to a stable error code; raw store errors
    /// are folded into InternalError rather than leaked verbatim.
    fn from_engine(err: EngineError) -> Self {
        use StatusCode as S;
        let message = err.to_string();
        let (status, code) = match &err {
            EngineError::ActorNotFound(_) => (S::NOT_FOUND, ErrorCode::ActorNotFound),
            EngineError::NameTaken(_) => (S::CONFLICT, ErrorCode::NameTaken),
            EngineError::InvalidRequest(_) => (S::BAD_REQUEST, ErrorCode::InvalidRequest),
            EngineError::Combat(combat) => match combat {
                CombatError::AttackerNotFound(_) => (S::NOT_FOUND, ErrorCode::ActorNotFound),
                CombatError::TargetNotFound(_) => (S::NOT_FOUND, ErrorCode::TargetNotFound),
                CombatError::SelfTarget => (S::BAD_REQUEST, ErrorCode::SelfTarget),
                CombatError::ProtectedTarget(_) => (S::FORBIDDEN, ErrorCode::ProtectedTarget),
                CombatError::AlreadyDead(_) => (S::CONFLICT, ErrorCode::AlreadyDead),
                CombatError::WrongLocation { .. } => (S::CONFLICT, ErrorCode::WrongLocation),
                CombatError::NoAmmoSelected => (S::BAD_REQUEST, ErrorCode::NoAmmoSelected),
                CombatError::InsufficientAmmo { .. } => {
                    (S::CONFLICT, ErrorCode::InsufficientAmmo)
                }
                CombatError::CooldownActive { .. } => (S::CONFLICT, ErrorCode::CooldownActive),
                CombatError::Detained => (S::CONFLICT, ErrorCode::Detained),
                CombatError::Contention { .. } => (S::CONFLICT, ErrorCode::StoreContention),
                CombatError::Store(_) => (S::INTERNAL_SERVER_ERROR, ErrorCode::InternalError),
            },
            EngineError::Detention(detention) => match detention {
                DetentionError::ActorNotFound(_) => (S::NOT_FOUND, ErrorCode::ActorNotFound),
                DetentionError::NotJailed(_) => (S::CONFLICT, ErrorCode::NotJailed),
                DetentionError::NoFunds { .. } => (S::CONFLICT, ErrorCode::NoFunds),
                DetentionError::Contention { .. } => (S::CONFLICT, ErrorCode::StoreContention),
                DetentionError::Store(_) => (S::INTERNAL_SERVER_ERROR, ErrorCode::InternalError),
            },
            EngineError::Bounty(bounty) => match bounty {
                BountyError::ActorNotFound(_) => (S::NOT_FOUND, ErrorCode::ActorNotFound),
                BountyError::BountyNotFound(_) => (S::NOT_FOUND, ErrorCode::BountyNotFound),
                BountyError::NotPoster { .. } => (S::FORBIDDEN, ErrorCode::InvalidRequest),
                BountyError::InvalidReward(_) => (S::BAD_REQUEST, ErrorCode::InvalidRequest),
                BountyError::NoFunds { .. } => (S::CONFLICT, ErrorCode::NoFunds),
                BountyError::Contention { .. } => (S::CONFLICT, ErrorCode::StoreContention),
                BountyError::Store(_) => (S::INTERNAL_SERVER_ERROR, ErrorCode::InternalError),
            },
            EngineError::Production(production) => match production {
                ProductionError::ActorNotFound(_) => (S::NOT_FOUND, ErrorCode::ActorNotFound),
                ProductionError::SlotOutOfRange { .. } => {
                    (S::BAD_REQUEST, ErrorCode::InvalidRequest)
                }
                ProductionError::ProductionRunning => {
                    (S::CONFLICT, ErrorCode::ProductionRunning)
                }
                ProductionError::MissingSelection { .. } => {
                    (S::BAD_REQUEST, ErrorCode::MissingSelection)
                }
                ProductionError::NothingCompleted => (S::CONFLICT, ErrorCode::NothingCompleted),
                ProductionError::Contention { .. } => (S::CONFLICT, ErrorCode::StoreContention),
                ProductionError::Store(_) => (S::INTERNAL_SERVER_ERROR, ErrorCode::InternalError),
            },
            EngineError::Contention { .. } => (S::CONFLICT, ErrorCode::StoreContention),
            EngineError::Store(_) => (S::INTERNAL_SERVER_ERROR, ErrorCode::InternalError),
        };

        if status == S::INTERNAL_SERVER_ERROR {
            return Self::internal("engine operation failed", Some(message));
        }
        Self::new(status, code, message, None)
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
