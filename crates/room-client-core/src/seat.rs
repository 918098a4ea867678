//! Seat model and the fixed-size seat list
//!
//! A seat is a numbered on-stage slot a user may occupy to publish audio and
//! video. The seat count is fixed for the lifetime of a room; seats are
//! never created or destroyed while the room is open, only opened, vacated,
//! locked, and unlocked.
//!
//! [`SeatList`] owns the collection and is the single place occupancy is
//! mutated, which is what keeps the one-seat-per-user rule from ever being
//! violated: seating a user anywhere first vacates any seat they already
//! hold.

use serde::{Deserialize, Serialize};

use crate::error::{RoomError, RoomResult};
use crate::user::User;

/// Occupancy status of a seat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatStatus {
    /// Nobody on the seat
    #[default]
    Closed,
    /// Occupied and publishing
    Open,
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeatStatus::Closed => write!(f, "Closed"),
            SeatStatus::Open => write!(f, "Open"),
        }
    }
}

/// Host action applied to a single seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatAction {
    /// Remove the occupant and return them to the audience
    Kick,
    /// Make an empty seat unavailable
    Lock,
    /// Make a locked seat available again
    Unlock,
    /// Close the occupant's microphone
    Mute,
    /// Reopen the occupant's microphone
    Unmute,
}

impl std::fmt::Display for SeatAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeatAction::Kick => write!(f, "Kick"),
            SeatAction::Lock => write!(f, "Lock"),
            SeatAction::Unlock => write!(f, "Unlock"),
            SeatAction::Mute => write!(f, "Mute"),
            SeatAction::Unmute => write!(f, "Unmute"),
        }
    }
}

/// One numbered on-stage slot
///
/// `locked` is tracked separately from occupancy: a locked seat is always
/// `Closed`, but a `Closed` seat is only unavailable while locked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    /// Position in the seat grid, 1..=N
    pub index: u8,
    /// Occupancy status
    pub status: SeatStatus,
    /// Whether the host has locked this seat against use
    pub locked: bool,
    /// Current occupant, present exactly when `status` is [`SeatStatus::Open`]
    pub occupant: Option<User>,
}

impl Seat {
    /// A fresh empty seat at the given index
    pub fn empty(index: u8) -> Self {
        Self {
            index,
            status: SeatStatus::Closed,
            locked: false,
            occupant: None,
        }
    }

    /// True when the seat can accept a new occupant
    pub fn is_available(&self) -> bool {
        self.status == SeatStatus::Closed && !self.locked
    }

    /// Id of the current occupant, if any
    pub fn occupant_id(&self) -> Option<&str> {
        self.occupant.as_ref().map(|u| u.id())
    }
}

/// The fixed-size collection of seats for the active room
///
/// # Examples
///
/// ```rust
/// use liveroom_client_core::seat::SeatList;
/// use liveroom_client_core::user::{User, UserInfo, UserRole};
///
/// let mut seats = SeatList::new(8);
/// let alice = User::from_info(UserInfo::new("u1", "alice"), UserRole::Audience);
///
/// seats.occupy(3, alice.clone()).unwrap();
/// assert_eq!(seats.seat_of("u1"), Some(3));
///
/// // Seating the same user elsewhere moves them; it never duplicates them.
/// seats.occupy(5, alice).unwrap();
/// assert_eq!(seats.seat_of("u1"), Some(5));
/// assert!(seats.get(3).unwrap().occupant.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatList {
    seats: Vec<Seat>,
}

impl SeatList {
    /// Create `count` empty seats, indexed 1..=count
    pub fn new(count: u8) -> Self {
        Self {
            seats: (1..=count).map(Seat::empty).collect(),
        }
    }

    /// Replace the whole list from a room snapshot
    pub fn from_snapshot(seats: Vec<Seat>) -> Self {
        Self { seats }
    }

    /// Number of seats in the room
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Whether the list holds no seats (only true outside a room)
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Borrow a seat by its 1-based index
    pub fn get(&self, index: u8) -> Option<&Seat> {
        self.seats.iter().find(|s| s.index == index)
    }

    fn get_mut(&mut self, index: u8) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.index == index)
    }

    /// Iterate over all seats in index order
    pub fn iter(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter()
    }

    /// Index of the seat a user occupies, if any
    pub fn seat_of(&self, user_id: &str) -> Option<u8> {
        self.seats
            .iter()
            .find(|s| s.occupant_id() == Some(user_id))
            .map(|s| s.index)
    }

    /// Borrow the occupant of the seat holding `user_id`
    pub fn occupant_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.seats
            .iter_mut()
            .filter_map(|s| s.occupant.as_mut())
            .find(|u| u.id() == user_id)
    }

    /// Seat a user, vacating any seat they already hold first.
    ///
    /// Fails when the index is unknown, the seat is locked, or the seat is
    /// occupied by somebody else. Seating a user on the seat they already
    /// occupy succeeds and reports no change.
    ///
    /// Returns true when occupancy actually changed.
    pub fn occupy(&mut self, index: u8, user: User) -> RoomResult<bool> {
        let target = self
            .get(index)
            .ok_or_else(|| RoomError::precondition(format!("no seat with index {index}")))?;

        match target.occupant_id() {
            Some(existing) if existing == user.id() => return Ok(false),
            Some(existing) => {
                return Err(RoomError::precondition(format!(
                    "seat {index} is already occupied by {existing}"
                )))
            }
            None => {}
        }
        if target.locked {
            return Err(RoomError::precondition(format!("seat {index} is locked")));
        }

        // One seat per user: leaving the old seat happens before taking the
        // new one, never after.
        self.vacate_user(user.id());

        let seat = self
            .get_mut(index)
            .ok_or_else(|| RoomError::internal("seat disappeared during occupy"))?;
        seat.status = SeatStatus::Open;
        seat.occupant = Some(user);
        Ok(true)
    }

    /// Empty a seat by index, returning the previous occupant if there was one
    pub fn vacate(&mut self, index: u8) -> Option<User> {
        let seat = self.get_mut(index)?;
        seat.status = SeatStatus::Closed;
        seat.occupant.take()
    }

    /// Remove a user from whichever seat they hold, if any
    pub fn vacate_user(&mut self, user_id: &str) -> Option<User> {
        let index = self.seat_of(user_id)?;
        self.vacate(index)
    }

    /// Lock or unlock a seat. Locking an occupied seat is rejected.
    ///
    /// Returns true when the flag actually changed.
    pub fn set_locked(&mut self, index: u8, locked: bool) -> RoomResult<bool> {
        let seat = self
            .get_mut(index)
            .ok_or_else(|| RoomError::precondition(format!("no seat with index {index}")))?;
        if locked && seat.status == SeatStatus::Open {
            return Err(RoomError::precondition(format!(
                "seat {index} is occupied and cannot be locked"
            )));
        }
        let changed = seat.locked != locked;
        seat.locked = locked;
        Ok(changed)
    }

    /// Set the occupant's mic switch. Rejected for empty seats.
    ///
    /// Returns true when the switch actually changed.
    pub fn set_occupant_mic(&mut self, index: u8, mic: crate::user::MediaSwitch) -> RoomResult<bool> {
        let seat = self
            .get_mut(index)
            .ok_or_else(|| RoomError::precondition(format!("no seat with index {index}")))?;
        let occupant = seat
            .occupant
            .as_mut()
            .ok_or_else(|| RoomError::precondition(format!("seat {index} has no occupant")))?;
        let changed = occupant.mic != mic;
        occupant.mic = mic;
        Ok(changed)
    }
}
