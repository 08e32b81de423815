//! RPC Methods - JSON-RPC method handlers
//!
//! Implements the registry contract exposed to training clients,
//! committee tooling, and consent apps. Mutating methods carry a signer
//! and a signature over the canonical command bytes; the verified signer
//! is the caller identity handed to the registry.

use std::str::FromStr;
use std::sync::Arc;

use fl_registry::{
    ClientId, Digest, MemberId, PatientId, Registry, RegistryError, TaskId,
};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::command::Command;

/// Gateway context shared across handlers
pub struct GatewayContext {
    pub registry: Arc<Registry>,
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFlConfigRequest {
    pub patient_id: String,
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlConfigResponse {
    pub round_index: u64,
    pub epsilon: f64,
    pub delta: f64,
    pub max_participants: u32,
    pub closed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRequest {
    pub task_id: String,
    pub round_index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResponse {
    pub task_id: String,
    pub round_index: u64,
    pub start_at: i64,
    pub end_at: i64,
    pub max_participants: u32,
    pub epsilon: f64,
    pub delta: f64,
    pub closed: bool,
    /// Absent until the committee finalizes the round.
    pub model_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub client_id: String,
    pub commit_hash: String,
    pub revealed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResultResponse {
    pub finalized: bool,
    pub model_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsMemberRequest {
    pub member_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantConsentRequest {
    pub patient_id: String,
    pub task_id: String,
    pub scope: String,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeConsentRequest {
    pub patient_id: String,
    pub task_id: String,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoundRequest {
    pub task_id: String,
    pub epsilon: f64,
    pub delta: f64,
    pub max_participants: u32,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoundResponse {
    pub round_index: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRoundRequest {
    pub task_id: String,
    pub round_index: u64,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommitRequest {
    pub task_id: String,
    pub round_index: u64,
    pub commit_hash: String,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRevealRequest {
    pub task_id: String,
    pub round_index: u64,
    pub commit_hash: String,
    pub reveal_hash: String,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteFinalizeRequest {
    pub task_id: String,
    pub round_index: u64,
    pub model_hash: String,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeModelRequest {
    pub task_id: String,
    pub round_index: u64,
    pub signer: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeModelResponse {
    pub model_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub member_id: String,
    pub signer: String,
    pub signature: String,
}

// ============ Read Handlers ============

/// Handle getFlConfig RPC method
pub fn handle_get_fl_config(
    ctx: &GatewayContext,
    params: GetFlConfigRequest,
) -> Result<FlConfigResponse, GatewayError> {
    let patient_id: PatientId = parse(&params.patient_id, "patientId")?;
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let config = ctx.registry.get_fl_config(&patient_id, &task_id)?;
    Ok(FlConfigResponse {
        round_index: config.round_index,
        epsilon: config.epsilon,
        delta: config.delta,
        max_participants: config.max_participants,
        closed: config.closed,
    })
}

/// Handle getRound RPC method
pub fn handle_get_round(
    ctx: &GatewayContext,
    params: RoundRequest,
) -> Result<RoundResponse, GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let round = ctx
        .registry
        .get_round(task_id, params.round_index)
        .ok_or(RegistryError::RoundNotFound)?;

    Ok(RoundResponse {
        task_id: round.task_id.to_string(),
        round_index: round.round_index,
        start_at: round.start_at,
        end_at: round.end_at,
        max_participants: round.max_participants,
        epsilon: round.epsilon,
        delta: round.delta,
        closed: round.closed,
        model_hash: round.is_finalized().then(|| round.model_hash.to_string()),
    })
}

/// Handle listParticipants RPC method
pub fn handle_list_participants(
    ctx: &GatewayContext,
    params: RoundRequest,
) -> Result<Vec<ParticipantInfo>, GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    Ok(ctx
        .registry
        .list_participants(task_id, params.round_index)
        .iter()
        .map(|p| ParticipantInfo {
            client_id: p.client_id.to_string(),
            commit_hash: p.commit_hash.to_string(),
            revealed: p.revealed,
        })
        .collect())
}

/// Handle getAggregateResult RPC method
pub fn handle_get_aggregate_result(
    ctx: &GatewayContext,
    params: RoundRequest,
) -> Result<AggregateResultResponse, GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let result = ctx.registry.aggregate_result(task_id, params.round_index)?;
    Ok(AggregateResultResponse {
        finalized: result.is_some(),
        model_hash: result.map(|h| h.to_string()),
    })
}

/// Handle isMember RPC method
pub fn handle_is_member(
    ctx: &GatewayContext,
    params: IsMemberRequest,
) -> Result<bool, GatewayError> {
    let member_id: MemberId = parse(&params.member_id, "memberId")?;
    Ok(ctx.registry.is_member(&member_id))
}

// ============ Mutating Handlers ============

/// Handle grantConsent RPC method
pub fn handle_grant_consent(
    ctx: &GatewayContext,
    params: GrantConsentRequest,
) -> Result<(), GatewayError> {
    let patient_id: PatientId = parse(&params.patient_id, "patientId")?;
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let command = Command::GrantConsent {
        patient_id,
        task_id,
        scope: params.scope.clone(),
    };
    // Any authenticated caller may grant for any patient: the identity
    // binding between caller and patient is an external-auth concern.
    authenticate(&params.signer, &params.signature, &command)?;

    ctx.registry.grant_consent(patient_id, task_id, &params.scope);
    Ok(())
}

/// Handle revokeConsent RPC method
pub fn handle_revoke_consent(
    ctx: &GatewayContext,
    params: RevokeConsentRequest,
) -> Result<(), GatewayError> {
    let patient_id: PatientId = parse(&params.patient_id, "patientId")?;
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let command = Command::RevokeConsent {
        patient_id,
        task_id,
    };
    authenticate(&params.signer, &params.signature, &command)?;

    ctx.registry.revoke_consent(patient_id, task_id);
    Ok(())
}

/// Handle openRound RPC method
pub fn handle_open_round(
    ctx: &GatewayContext,
    params: OpenRoundRequest,
) -> Result<OpenRoundResponse, GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let command = Command::OpenRound {
        task_id,
        epsilon: params.epsilon,
        delta: params.delta,
        max_participants: params.max_participants,
    };
    let caller = MemberId(authenticate(&params.signer, &params.signature, &command)?);

    let round_index = ctx.registry.open_round(
        &caller,
        task_id,
        params.epsilon,
        params.delta,
        params.max_participants,
    )?;
    Ok(OpenRoundResponse { round_index })
}

/// Handle closeRound RPC method
pub fn handle_close_round(
    ctx: &GatewayContext,
    params: CloseRoundRequest,
) -> Result<(), GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let command = Command::CloseRound {
        task_id,
        round_index: params.round_index,
    };
    let caller = MemberId(authenticate(&params.signer, &params.signature, &command)?);

    ctx.registry.close_round(&caller, task_id, params.round_index)?;
    Ok(())
}

/// Handle submitCommit RPC method
pub fn handle_submit_commit(
    ctx: &GatewayContext,
    params: SubmitCommitRequest,
) -> Result<(), GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;
    let commit_hash: Digest = parse(&params.commit_hash, "commitHash")?;

    let command = Command::SubmitCommit {
        task_id,
        round_index: params.round_index,
        commit_hash,
    };
    let client = ClientId(authenticate(&params.signer, &params.signature, &command)?);

    ctx.registry
        .submit_commit(task_id, params.round_index, client, commit_hash)?;
    Ok(())
}

/// Handle submitReveal RPC method
pub fn handle_submit_reveal(
    ctx: &GatewayContext,
    params: SubmitRevealRequest,
) -> Result<(), GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;
    let commit_hash: Digest = parse(&params.commit_hash, "commitHash")?;
    let reveal_hash: Digest = parse(&params.reveal_hash, "revealHash")?;

    let command = Command::SubmitReveal {
        task_id,
        round_index: params.round_index,
        commit_hash,
        reveal_hash,
    };
    let client = ClientId(authenticate(&params.signer, &params.signature, &command)?);

    ctx.registry.submit_reveal(
        task_id,
        params.round_index,
        client,
        commit_hash,
        reveal_hash,
    )?;
    Ok(())
}

/// Handle voteFinalize RPC method
pub fn handle_vote_finalize(
    ctx: &GatewayContext,
    params: VoteFinalizeRequest,
) -> Result<(), GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;
    let model_hash: Digest = parse(&params.model_hash, "modelHash")?;

    let command = Command::VoteFinalize {
        task_id,
        round_index: params.round_index,
        model_hash,
    };
    let voter = MemberId(authenticate(&params.signer, &params.signature, &command)?);

    ctx.registry
        .vote_finalize(&voter, task_id, params.round_index, model_hash)?;
    Ok(())
}

/// Handle finalizeModel RPC method
pub fn handle_finalize_model(
    ctx: &GatewayContext,
    params: FinalizeModelRequest,
) -> Result<FinalizeModelResponse, GatewayError> {
    let task_id: TaskId = parse(&params.task_id, "taskId")?;

    let command = Command::FinalizeModel {
        task_id,
        round_index: params.round_index,
    };
    // Finalization is deterministic over the cast votes, so any
    // authenticated caller may trigger it.
    authenticate(&params.signer, &params.signature, &command)?;

    let winner = ctx.registry.finalize_model(task_id, params.round_index)?;
    Ok(FinalizeModelResponse {
        model_hash: winner.to_string(),
    })
}

/// Handle addMember RPC method
pub fn handle_add_member(
    ctx: &GatewayContext,
    params: MembershipRequest,
) -> Result<(), GatewayError> {
    let member_id: MemberId = parse(&params.member_id, "memberId")?;

    let command = Command::AddMember { member_id };
    let caller = MemberId(authenticate(&params.signer, &params.signature, &command)?);

    ctx.registry.add_member(&caller, member_id)?;
    Ok(())
}

/// Handle removeMember RPC method
pub fn handle_remove_member(
    ctx: &GatewayContext,
    params: MembershipRequest,
) -> Result<(), GatewayError> {
    let member_id: MemberId = parse(&params.member_id, "memberId")?;

    let command = Command::RemoveMember { member_id };
    let caller = MemberId(authenticate(&params.signer, &params.signature, &command)?);

    ctx.registry.remove_member(&caller, &member_id)?;
    Ok(())
}

// ============ Helpers ============

fn parse<T: FromStr>(value: &str, what: &str) -> Result<T, GatewayError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GatewayError::InvalidParams(format!("{what}: {e}")))
}

fn authenticate(
    signer: &str,
    signature: &str,
    command: &Command,
) -> Result<[u8; 32], GatewayError> {
    auth::verify_signer(signer, signature, &command.to_bytes())
        .map_err(|e| GatewayError::Unauthorized(e.to_string()))
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use ed25519_dalek::{Signer, SigningKey};

    /// Helper wrapping a signing key with request-field encoding.
    struct TestSigner {
        key: SigningKey,
    }

    impl TestSigner {
        fn new() -> Self {
            Self {
                key: SigningKey::from_bytes(&rand::random::<[u8; 32]>()),
            }
        }

        fn id(&self) -> [u8; 32] {
            *self.key.verifying_key().as_bytes()
        }

        fn signer(&self) -> String {
            bs58::encode(self.id()).into_string()
        }

        fn sign(&self, command: &Command) -> String {
            BASE64.encode(self.key.sign(&command.to_bytes()).to_bytes())
        }
    }

    fn setup() -> (GatewayContext, TestSigner) {
        let registry = Arc::new(Registry::new());
        let admin = TestSigner::new();
        registry.bootstrap_committee(&[MemberId(admin.id())]).unwrap();
        (GatewayContext { registry }, admin)
    }

    fn open_round(ctx: &GatewayContext, admin: &TestSigner, task_id: TaskId) -> u64 {
        let command = Command::OpenRound {
            task_id,
            epsilon: 10.0,
            delta: 1e-6,
            max_participants: 2,
        };
        let response = handle_open_round(
            ctx,
            OpenRoundRequest {
                task_id: task_id.to_string(),
                epsilon: 10.0,
                delta: 1e-6,
                max_participants: 2,
                signer: admin.signer(),
                signature: admin.sign(&command),
            },
        )
        .unwrap();
        response.round_index
    }

    #[test]
    fn test_consent_and_config_flow() {
        let (ctx, admin) = setup();
        let patient = PatientId::new_unique();
        let task = TaskId::from_seed(b"retina-screening");
        let consenter = TestSigner::new();

        let command = Command::GrantConsent {
            patient_id: patient,
            task_id: task,
            scope: "imaging".to_string(),
        };
        handle_grant_consent(
            &ctx,
            GrantConsentRequest {
                patient_id: patient.to_string(),
                task_id: task.to_string(),
                scope: "imaging".to_string(),
                signer: consenter.signer(),
                signature: consenter.sign(&command),
            },
        )
        .unwrap();

        open_round(&ctx, &admin, task);

        let config = handle_get_fl_config(
            &ctx,
            GetFlConfigRequest {
                patient_id: patient.to_string(),
                task_id: task.to_string(),
            },
        )
        .unwrap();
        assert_eq!(config.round_index, 1);
        assert_eq!(config.max_participants, 2);
    }

    #[test]
    fn test_commit_binds_client_to_signer() {
        let (ctx, admin) = setup();
        let task = TaskId::from_seed(b"ecg-arrhythmia");
        let round_index = open_round(&ctx, &admin, task);

        let client = TestSigner::new();
        let commit_hash = Digest::of(b"masked-update");
        let command = Command::SubmitCommit {
            task_id: task,
            round_index,
            commit_hash,
        };
        handle_submit_commit(
            &ctx,
            SubmitCommitRequest {
                task_id: task.to_string(),
                round_index,
                commit_hash: commit_hash.to_string(),
                signer: client.signer(),
                signature: client.sign(&command),
            },
        )
        .unwrap();

        let participants = handle_list_participants(
            &ctx,
            RoundRequest {
                task_id: task.to_string(),
                round_index,
            },
        )
        .unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].client_id, client.signer());
        assert!(!participants[0].revealed);
    }

    #[test]
    fn test_signature_over_wrong_payload_rejected() {
        let (ctx, admin) = setup();
        let task = TaskId::from_seed(b"ecg-arrhythmia");
        let round_index = open_round(&ctx, &admin, task);

        let client = TestSigner::new();
        let commit_hash = Digest::of(b"masked-update");
        // Signed for round 99, submitted for the open round.
        let command = Command::SubmitCommit {
            task_id: task,
            round_index: 99,
            commit_hash,
        };
        let result = handle_submit_commit(
            &ctx,
            SubmitCommitRequest {
                task_id: task.to_string(),
                round_index,
                commit_hash: commit_hash.to_string(),
                signer: client.signer(),
                signature: client.sign(&command),
            },
        );
        assert!(matches!(result, Err(GatewayError::Unauthorized(_))));
    }

    #[test]
    fn test_non_member_open_round_rejected() {
        let (ctx, _) = setup();
        let outsider = TestSigner::new();
        let task = TaskId::from_seed(b"task");

        let command = Command::OpenRound {
            task_id: task,
            epsilon: 1.0,
            delta: 1e-5,
            max_participants: 4,
        };
        let result = handle_open_round(
            &ctx,
            OpenRoundRequest {
                task_id: task.to_string(),
                epsilon: 1.0,
                delta: 1e-5,
                max_participants: 4,
                signer: outsider.signer(),
                signature: outsider.sign(&command),
            },
        );
        assert!(matches!(
            result,
            Err(GatewayError::Registry(RegistryError::Unauthorized))
        ));
    }

    #[test]
    fn test_finalize_round_trip() {
        let (ctx, admin) = setup();
        let task = TaskId::from_seed(b"mri-denoising");
        let round_index = open_round(&ctx, &admin, task);

        let close = Command::CloseRound {
            task_id: task,
            round_index,
        };
        handle_close_round(
            &ctx,
            CloseRoundRequest {
                task_id: task.to_string(),
                round_index,
                signer: admin.signer(),
                signature: admin.sign(&close),
            },
        )
        .unwrap();

        let model_hash = Digest::of(b"aggregated-model");
        let vote = Command::VoteFinalize {
            task_id: task,
            round_index,
            model_hash,
        };
        handle_vote_finalize(
            &ctx,
            VoteFinalizeRequest {
                task_id: task.to_string(),
                round_index,
                model_hash: model_hash.to_string(),
                signer: admin.signer(),
                signature: admin.sign(&vote),
            },
        )
        .unwrap();

        let finalize = Command::FinalizeModel {
            task_id: task,
            round_index,
        };
        let response = handle_finalize_model(
            &ctx,
            FinalizeModelRequest {
                task_id: task.to_string(),
                round_index,
                signer: admin.signer(),
                signature: admin.sign(&finalize),
            },
        )
        .unwrap();
        assert_eq!(response.model_hash, model_hash.to_string());

        let result = handle_get_aggregate_result(
            &ctx,
            RoundRequest {
                task_id: task.to_string(),
                round_index,
            },
        )
        .unwrap();
        assert!(result.finalized);
        assert_eq!(result.model_hash, Some(model_hash.to_string()));
    }
}
