//! QuizStake Instant Quiz Contract
//!
//! A stake-backed quiz round with immediate settlement. Participants lock
//! the entry fee to join a round, every participant submits exactly one
//! score, and the pot pays out to the top scorer the moment the last
//! participant has been evaluated.
//!
//! ## Round Flow
//! 1. `create_quiz` — the creator stakes the entry fee and is enrolled as
//!    the first participant.
//! 2. `join_quiz` — further participants stake while the round is open.
//! 3. `start_quiz` — moves the round to Ongoing; no more joins.
//! 4. `submit_score` — each participant is evaluated once; the round closes
//!    and settles automatically when the last submission lands.
//!
//! ## Settlement
//! The winner receives `total_stake - fee`, where
//! `fee = total_stake * fee_bps / 10000`. A strictly higher score is needed
//! to take the lead, so on a tie the earliest submitter keeps it. A solo
//! creator can cancel an un-started round and is refunded minus the same
//! fee rate.
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
    OperatorStart,
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
pub struct QuizStarted {
    #[topic]
    pub quiz_id: BytesN<32>,
    pub state: u32,
    pub caller: Address,
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
pub struct InstantQuiz;

#[contractimpl]
impl InstantQuiz {
    /// Initialize the contract.
    ///
    /// `entry_fee` is the stake every participant locks to enter a round.
    /// `fee_bps` is the protocol fee in basis points (e.g. 500 = 5%).
    /// `operator_start` gates `start_quiz` to the round's creator when true;
    /// when false any joined participant may start the round.
    pub fn init(
        env: Env,
        admin: Address,
        token: Address,
        entry_fee: i128,
        fee_bps: u32,
        operator_start: bool,
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

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage().instance().set(&DataKey::EntryFee, &entry_fee);
        env.storage().instance().set(&DataKey::FeeBps, &fee_bps);
        env.storage().instance().set(&DataKey::FeeAddress, &admin);
        env.storage()
            .instance()
            .set(&DataKey::OperatorStart, &operator_start);
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
    /// participant, and stakes one entry fee.
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
        }
        .publish(&env);

        Ok(())
    }

    /// Join an open round by staking its entry fee.
    pub fn join_quiz(env: Env, quiz_id: BytesN<32>, player: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        if quiz.state != QuizState::Open {
            return Err(invalid_state(quiz.state));
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

    /// Move an open round to Ongoing, freezing its participant set.
    ///
    /// The caller must have joined the round. When the contract was
    /// initialized with `operator_start`, only the operator may start.
    pub fn start_quiz(env: Env, quiz_id: BytesN<32>, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        caller.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        if !has_joined(&env, &quiz_id, &caller) {
            return Err(Error::NotParticipant);
        }
        if quiz.state != QuizState::Open {
            return Err(invalid_state(quiz.state));
        }
        if operator_start(&env) && caller != quiz.operator {
            return Err(Error::MustBeOperator);
        }

        quiz.state = QuizState::Ongoing;
        set_persistent(&env, DataKey::Quiz(quiz_id.clone()), &quiz);

        QuizStarted {
            quiz_id,
            state: QuizState::Ongoing as u32,
            caller,
        }
        .publish(&env);

        Ok(())
    }

    /// Record a participant's score. Each participant submits exactly once
    /// and a zero score is rejected.
    ///
    /// The leader only changes on a strictly higher score. When the last
    /// participant submits, the round closes and pays out in the same call.
    pub fn submit_score(
        env: Env,
        quiz_id: BytesN<32>,
        player: Address,
        score: u64,
    ) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        if quiz.state != QuizState::Ongoing {
            return Err(invalid_state(quiz.state));
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

        PartipantEvaluated {
            quiz_id: quiz_id.clone(),
            player,
            state: QuizState::Ongoing as u32,
            score,
        }
        .publish(&env);

        if quiz.submission_count == quiz.participant_count {
            // Last evaluation — close and settle in the same invocation.
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
        } else {
            set_persistent(&env, DataKey::Quiz(quiz_id), &quiz);
        }

        Ok(())
    }

    /// Cancel an open round that still has no participant besides its
    /// creator. The stake is refunded to the operator minus the protocol
    /// fee, at the same rate as a normal close.
    pub fn cancel_quiz(env: Env, quiz_id: BytesN<32>, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        caller.require_auth();

        let mut quiz = load_quiz(&env, &quiz_id)?;
        if caller != quiz.operator {
            return Err(Error::MustBeOperator);
        }
        if quiz.state != QuizState::Open {
            return Err(invalid_state(quiz.state));
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

    pub fn entry_fee(env: Env) -> Result<i128, Error> {
        get_entry_fee(&env)
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

fn operator_start(env: &Env) -> bool {
    env.storage()
        .instance()
        .get(&DataKey::OperatorStart)
        .unwrap_or(false)
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

/// Map a state to the rejection naming it, so callers surface which
/// state blocked the operation.
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
