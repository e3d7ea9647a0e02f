//! QuizStake Timed Quiz Contract
//!
//! A stake-backed quiz round driven by wall-clock deadlines. At creation the
//! round precomputes three cumulative deadlines — joining, playing,
//! submitting — from the contract's configured periods. The stored state
//! stays Open while the round runs; every operation is gated on the
//! *effective phase* derived from those deadlines and the current ledger
//! time, never on a cached phase.
//!
//! ## Round Flow
//! 1. `create_quiz` — the creator stakes the entry fee, is enrolled as the
//!    first participant, and the deadlines are fixed.
//! 2. `join_quiz` — allowed only while the joining window is open.
//! 3. `submit_score` — allowed only inside the submission window; each
//!    participant is evaluated once. Submissions never auto-close the round.
//! 4. `close_quiz` — explicit and permissionless once the submission window
//!    has elapsed; pays the top scorer and accrues the protocol fee.
//!
//! ## Settlement
//! The winner receives `total_stake - fee`, where
//! `fee = total_stake * fee_bps / 10000`. A strictly higher score is needed
//! to take the lead, so on a tie the earliest submitter keeps it. A solo
//! creator can cancel while the joining window is still open and is refunded
//! minus the same fee rate.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token::TokenClient,
    Address, BytesN, Env,
};

use shared::{calculate_fee, QuizState, BASIS_POINTS_DIVISOR};

pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    Unauthorized = 3,
    QuizExists = 4,
    QuizMissing = 5,
    InvalidStateOpen = 6,
    InvalidStateOngoing = 7,
    InvalidStateClosed = 8,
    InvalidStateSubmitting = 9,
    InvalidStateCancelled = 10,
    InvalidWinner = 11,
    NotParticipant = 12,
    IsParticipant = 13,
    ParticipantAlreadySubmitted = 14,
    MustBeOperator = 15,
    ZeroNumber = 16,
    QuizHasParticipants = 17,
    Overflow = 18,
    InvalidFeeBps = 19,
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Token,
    EntryFee,
    FeeBps,
    FeeAddress,
    AccumulatedFee,
    JoinPeriod,
    QuizDuration,
    SubmitPeriod,
    Quiz(BytesN<32>),
    Participant(BytesN<32>, Address),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Quiz {
    pub operator: Address,
    pub state: QuizState,
    pub entry_fee: i128,
    pub total_stake: i128,
    pub participant_count: u32,
    pub submission_count: u32,
    pub top_scorer: Option<Address>,
    pub highest_score: u64,
    pub join_deadline: u64,
    pub play_deadline: u64,
    pub submit_deadline: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Participant {
    pub playing: bool,
    pub submitted: bool,
    pub score: u64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    #[topic]
    pub admin: Address,
    pub token: Address,
    pub entry_fee: i128,
}

#[contractevent]
pub struct QuizOpened {
    #[topic]
    pub quiz_id: BytesN<32>,
    pub state: u32,
    pub operator: Address,
    pub entry_fee: i128,
    pub join_deadline: u64,
    pub play_deadline: u64,
    pub submit_deadline: u64,
}

#[contractevent]
pub struct PartipantJoined {
    #[topic]
    pub quiz_id: BytesN<32>,
    #[topic]
    pub player: Address,
    pub state: u32,
}

#[contractevent]
pub struct PartipantEvaluated {
    #[topic]
    pub quiz_id: BytesN<32>,
    #[topic]
    pub player: Address,
    pub state: u32,
    pub score: u64,
}

#[contractevent]
pub struct QuizClosed {
    #[topic]
    pub quiz_id: BytesN<32>,
    pub state: u32,
    pub winner: Address,
    pub winnings: i128,
    pub fee: i128,
}

#[contractevent]
pub struct QuizCancelled {
    #[topic]
    pub quiz_id: BytesN<32>,
    pub state: u32,
    pub operator: Address,
    pub refund: i128,
    pub fee: i128,
}

#[contractevent]
pub struct FeeAddressUpdated {
    pub admin: Address,
    pub fee_address: Address,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct TimedQuiz;

#[contractimpl]
impl TimedQuiz {
    /// Initialize the contract.
    ///
    /// `entry_fee` is the stake every participant locks to enter a round.
    /// `fee_bps` is the protocol fee in basis points (e.g. 500 = 5%).
    /// `join_period`, `quiz_duration` and `submit_period` are the phase
    /// lengths, in seconds, used to fix each round's deadlines at creation.
    pub fn init(
        env: Env,
        admin: Address,
        token: Address,
        entry_fee: i128,
        fee_bps: u32,
        join_period: u64,
        quiz_duration: u64,
        submit_period: u64,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();

        if entry_fee <= 0 {
            return Err(Error::ZeroNumber);
        }
        if fee_bps > BASIS_POINTS_DIVISOR {
            return Err(Error::InvalidFeeBps);
        }
        // Zero-length phases would collapse the deadlines into each other.
        if join_period == 0 || quiz_duration == 0 || submit_period == 0 {
            return Err(Error::ZeroNumber);
        }

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage().instance().set(&DataKey::EntryFee, &entry_fee);
        env.storage().instance().set(&DataKey::FeeBps, &fee_bps);
        env.storage().instance().set(&DataKey::FeeAddress, &admin);
        env.storage()
            .instance()
            .set(&DataKey::JoinPeriod, &join_period);
        env.storage()
            .instance()
            .set(&DataKey::QuizDuration, &quiz_duration);
        env.storage()
            .instance()
            .set(&DataKey::SubmitPeriod, &submit_period);
        env.storage()
            .instance()
            .extend_ttl(PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        Initialized {
            admin,
            token,
            entry_fee,
        }
        .publish(&env);

        Ok(())
    }

    /// Open a new quiz round under a caller-chosen 32-byte identifier.
    ///
    /// The creator becomes the round's operator, is enrolled as its first
    /// participant, and stakes one entry fee. The three deadlines are
    /// computed cumulatively from the current ledger time and never change.
    pub fn create_quiz(env: Env, quiz_id: BytesN<32>, creator: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        creator.require_auth();

        if env
            .storage()
            .persistent()
            .has(&DataKey::Quiz(quiz_id.clone()))
        {
            return Err(Error::QuizExists);
        }

        let now = env.ledger().timestamp();
        let join_deadline = now
            .checked_add(get_period(&env, DataKey::JoinPeriod)?)
            .ok_or(Error::Overflow)?;
        let play_deadline = join_deadline
            .checked_add(get_period(&env, DataKey::QuizDuration)?)
            .ok_or(Error::Overflow)?;
        let submit_deadline = play_deadline
            .checked_add(get_period(&env, DataKey::SubmitPeriod)?)
            .ok_or(Error::Overflow)?;

        let entry_fee = get_entry_fee(&env)?;
        stake_in(&env, &creator, entry_fee)?;

        let quiz = Quiz {
            operator: creator.clone(),
            state: QuizState::Open,
            entry_fee,
            total_stake: entry_fee,
            participant_count: 1,
            submission_count: 0,
            top_scorer: None,
            highest_score: 0,
            join_deadline,
            play_deadline,
            submit_deadline,
        };
        set_persistent(&env, DataKey::Quiz(quiz_id.clone()), &quiz);
        set_persistent(
            &env,
            DataKey::Participant(quiz_id.clone(), creator.clone()),
            &Participant {
                playing: true,
                submitted: false,
                score: 0,
            },
        );

        QuizOpened {
            quiz_id,
            state: QuizState::Open as u32,
            operator: creator,
            entry_fee,
            join_deadline,
            play_deadline,
            submit_deadline,
        }
        .publish(&env);

        Ok(())
    }

    /// Join a round by staking its entry fee. Allowed only while the joining
    /// window is open; afterwards the rejection names the phase the round
    /// has moved into, even though the stored state is still Open.
    pub fn join_quiz(env: Env, quiz_id: BytesN<32>, player: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        let phase = effective_phase(&quiz, env.ledger().timestamp());
        if phase != QuizState::Open {
            return Err(invalid_state(phase));
        }
        if has_joined(&env, &quiz_id, &player) {
            return Err(Error::IsParticipant);
        }

        stake_in(&env, &player, quiz.entry_fee)?;

        quiz.participant_count = quiz
            .participant_count
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        quiz.total_stake = quiz
            .total_stake
            .checked_add(quiz.entry_fee)
            .ok_or(Error::Overflow)?;
        set_persistent(&env, DataKey::Quiz(quiz_id.clone()), &quiz);
        set_persistent(
            &env,
            DataKey::Participant(quiz_id.clone(), player.clone()),
            &Participant {
                playing: true,
                submitted: false,
                score: 0,
            },
        );

        PartipantJoined {
            quiz_id,
            player,
            state: QuizState::Open as u32,
        }
        .publish(&env);

        Ok(())
    }

    /// Record a participant's score. Allowed only inside the submission
    /// window; each participant submits exactly once and a zero score is
    /// rejected.
    ///
    /// The leader only changes on a strictly higher score. Unlike the
    /// instant variant, the last submission does not close the round —
    /// closure always waits for the submit deadline.
    pub fn submit_score(
        env: Env,
        quiz_id: BytesN<32>,
        player: Address,
        score: u64,
    ) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        let phase = effective_phase(&quiz, env.ledger().timestamp());
        if phase != QuizState::Submitting {
            return Err(invalid_state(phase));
        }
        let mut participant = load_participant(&env, &quiz_id, &player)?;
        if score == 0 {
            return Err(Error::ZeroNumber);
        }
        if participant.submitted {
            return Err(Error::ParticipantAlreadySubmitted);
        }

        participant.submitted = true;
        participant.score = score;
        set_persistent(
            &env,
            DataKey::Participant(quiz_id.clone(), player.clone()),
            &participant,
        );

        quiz.submission_count = quiz
            .submission_count
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        if score > quiz.highest_score {
            quiz.highest_score = score;
            quiz.top_scorer = Some(player.clone());
        }
        set_persistent(&env, DataKey::Quiz(quiz_id.clone()), &quiz);

        PartipantEvaluated {
            quiz_id,
            player,
            state: QuizState::Submitting as u32,
            score,
        }
        .publish(&env);

        Ok(())
    }

    /// Close a round once its submit deadline has passed and pay the top
    /// scorer. Permissionless: the outcome is fully determined by the
    /// recorded scores, so no authorization is required.
    pub fn close_quiz(env: Env, quiz_id: BytesN<32>) -> Result<(), Error> {
        require_initialized(&env)?;

        let mut quiz = load_quiz(&env, &quiz_id)?;
        let phase = effective_phase(&quiz, env.ledger().timestamp());
        if phase != QuizState::Closed || quiz.state != QuizState::Open {
            return Err(invalid_state(phase));
        }
        let winner = quiz.top_scorer.clone().ok_or(Error::InvalidWinner)?;

        quiz.state = QuizState::Closed;
        set_persistent(&env, DataKey::Quiz(quiz_id.clone()), &quiz);

        let (winnings, fee) = settle(&env, quiz.total_stake, &winner)?;

        QuizClosed {
            quiz_id,
            state: QuizState::Closed as u32,
            winner,
            winnings,
            fee,
        }
        .publish(&env);

        Ok(())
    }

    /// Cancel a round whose joining window is still open and that has no
    /// participant besides its creator. The stake is refunded to the
    /// operator minus the protocol fee, at the same rate as a normal close.
    pub fn cancel_quiz(env: Env, quiz_id: BytesN<32>, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        caller.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        if caller != quiz.operator {
            return Err(Error::MustBeOperator);
        }
        let phase = effective_phase(&quiz, env.ledger().timestamp());
        if phase != QuizState::Open {
            return Err(invalid_state(phase));
        }
        if quiz.participant_count > 1 {
            return Err(Error::QuizHasParticipants);
        }

        quiz.state = QuizState::Cancelled;
        set_persistent(&env, DataKey::Quiz(quiz_id.clone()), &quiz);

        let (refund, fee) = settle(&env, quiz.total_stake, &quiz.operator)?;

        QuizCancelled {
            quiz_id,
            state: QuizState::Cancelled as u32,
            operator: quiz.operator,
            refund,
            fee,
        }
        .publish(&env);

        Ok(())
    }

    /// View a round's record.
    pub fn get_quiz(env: Env, quiz_id: BytesN<32>) -> Result<Quiz, Error> {
        load_quiz(&env, &quiz_id)
    }

    /// View a participant's record within a round.
    pub fn get_participant(
        env: Env,
        quiz_id: BytesN<32>,
        player: Address,
    ) -> Result<Participant, Error> {
        load_quiz(&env, &quiz_id)?;
        load_participant(&env, &quiz_id, &player)
    }

    /// The round's effective phase code at the current ledger time.
    pub fn current_phase(env: Env, quiz_id: BytesN<32>) -> Result<u32, Error> {
        let quiz = load_quiz(&env, &quiz_id)?;
        Ok(effective_phase(&quiz, env.ledger().timestamp()) as u32)
    }

    pub fn entry_fee(env: Env) -> Result<i128, Error> {
        get_entry_fee(&env)
    }

    pub fn join_period(env: Env) -> Result<u64, Error> {
        get_period(&env, DataKey::JoinPeriod)
    }

    pub fn quiz_duration(env: Env) -> Result<u64, Error> {
        get_period(&env, DataKey::QuizDuration)
    }

    pub fn submit_period(env: Env) -> Result<u64, Error> {
        get_period(&env, DataKey::SubmitPeriod)
    }

    pub fn admin_fee_bps(env: Env) -> Result<u32, Error> {
        get_fee_bps(&env)
    }

    pub fn fee_address(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::FeeAddress)
            .ok_or(Error::NotInitialized)
    }

    /// Total protocol fees ever extracted, across all rounds.
    pub fn accumulated_fee(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::AccumulatedFee)
            .unwrap_or(0)
    }

    /// Update the fee collection address (admin only).
    pub fn set_fee_address(env: Env, admin: Address, new_address: Address) -> Result<(), Error> {
        require_admin(&env, &admin)?;

        env.storage()
            .instance()
            .set(&DataKey::FeeAddress, &new_address);

        FeeAddressUpdated {
            admin,
            fee_address: new_address,
        }
        .publish(&env);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Phase derivation
// ---------------------------------------------------------------------------

/// Derive the effective phase from the stored deadlines and the current
/// time. Terminal stored states win; otherwise the phase is a pure function
/// of `now` and is never persisted.
fn effective_phase(quiz: &Quiz, now: u64) -> QuizState {
    match quiz.state {
        QuizState::Closed | QuizState::Cancelled => quiz.state,
        _ => {
            if now < quiz.join_deadline {
                QuizState::Open
            } else if now < quiz.play_deadline {
                QuizState::Ongoing
            } else if now < quiz.submit_deadline {
                QuizState::Submitting
            } else {
                QuizState::Closed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    if *caller != admin {
        return Err(Error::Unauthorized);
    }
    caller.require_auth();
    Ok(())
}

fn get_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)
}

fn get_entry_fee(env: &Env) -> Result<i128, Error> {
    env.storage()
        .instance()
        .get(&DataKey::EntryFee)
        .ok_or(Error::NotInitialized)
}

fn get_fee_bps(env: &Env) -> Result<u32, Error> {
    env.storage()
        .instance()
        .get(&DataKey::FeeBps)
        .ok_or(Error::NotInitialized)
}

fn get_period(env: &Env, key: DataKey) -> Result<u64, Error> {
    env.storage()
        .instance()
        .get(&key)
        .ok_or(Error::NotInitialized)
}

fn load_quiz(env: &Env, quiz_id: &BytesN<32>) -> Result<Quiz, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Quiz(quiz_id.clone()))
        .ok_or(Error::QuizMissing)
}

fn load_participant(
    env: &Env,
    quiz_id: &BytesN<32>,
    player: &Address,
) -> Result<Participant, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Participant(quiz_id.clone(), player.clone()))
        .ok_or(Error::NotParticipant)
}

fn has_joined(env: &Env, quiz_id: &BytesN<32>, player: &Address) -> bool {
    env.storage()
        .persistent()
        .has(&DataKey::Participant(quiz_id.clone(), player.clone()))
}

/// Map a state or phase to the rejection naming it, so callers surface
/// which phase blocked the operation.
fn invalid_state(state: QuizState) -> Error {
    match state {
        QuizState::Open => Error::InvalidStateOpen,
        QuizState::Ongoing => Error::InvalidStateOngoing,
        QuizState::Closed => Error::InvalidStateClosed,
        QuizState::Submitting => Error::InvalidStateSubmitting,
        QuizState::Cancelled => Error::InvalidStateCancelled,
    }
}

fn stake_in(env: &Env, from: &Address, amount: i128) -> Result<(), Error> {
    let token = get_token(env)?;
    TokenClient::new(env, &token).transfer(from, &env.current_contract_address(), &amount);
    Ok(())
}

/// Pay out `total_stake` minus the protocol fee to `payee` and grow the
/// fee accumulator. All storage writes land before the token call.
fn settle(env: &Env, total_stake: i128, payee: &Address) -> Result<(i128, i128), Error> {
    let fee_bps = get_fee_bps(env)?;
    let fee = calculate_fee(total_stake, fee_bps).map_err(|_| Error::Overflow)?;
    let winnings = total_stake.checked_sub(fee).ok_or(Error::Overflow)?;

    let accumulated: i128 = env
        .storage()
        .instance()
        .get(&DataKey::AccumulatedFee)
        .unwrap_or(0);
    let accumulated = accumulated.checked_add(fee).ok_or(Error::Overflow)?;
    env.storage()
        .instance()
        .set(&DataKey::AccumulatedFee, &accumulated);

    let token = get_token(env)?;
    TokenClient::new(env, &token).transfer(&env.current_contract_address(), payee, &winnings);

    Ok((winnings, fee))
}

fn set_persistent<T>(env: &Env, key: DataKey, value: &T)
where
    T: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(&key, value);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
