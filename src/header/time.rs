//! Epoch and frame time arithmetic.
//!
//! Frame times are seconds since the reference epoch plus a frame number within the second.
//! The reference epoch is a half year since 2000, i.e., January 1 or July 1 of some year.
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use super::{Header, FRAMES_PER_SECOND_SENTINEL, SECONDS_MASK};
use crate::{Error, Result};

const SECONDS_PER_DAY: u64 = 86_400;
/// Days between 0001-01-01 (CE day 1) and the MJD zero point, 1858-11-17.
const MJD_CE_OFFSET: i32 = 678_576;
/// MJD of the Unix epoch.
const UNIX_MJD: i64 = 40_587;

/// Modified Julian Day of the given calendar date, or `None` if the date does not exist.
#[must_use]
pub fn mjd_from_ymd(year: i32, month: u32, day: u32) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(i64::from(date.num_days_from_ce() - MJD_CE_OFFSET))
}

/// Calendar date `(year, month, day)` of a Modified Julian Day.
#[must_use]
pub fn ymd_from_mjd(mjd: i64) -> Option<(i32, u32, u32)> {
    let days = i32::try_from(mjd).ok()?.checked_add(MJD_CE_OFFSET)?;
    let date = NaiveDate::from_num_days_from_ce_opt(days)?;
    Some((date.year(), date.month(), date.day()))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
impl Header {
    /// MJD of the reference epoch.
    #[must_use]
    pub fn epoch_mjd(&self) -> i64 {
        let epoch = i32::from(self.epoch);
        mjd_from_ymd(2000 + epoch / 2, (epoch as u32 % 2) * 6 + 1, 1)
            .expect("every epoch is a valid half year date")
    }

    /// MJD of the day containing this frame.
    #[must_use]
    pub fn frame_mjd(&self) -> i64 {
        self.epoch_mjd() + i64::from(self.seconds) / SECONDS_PER_DAY as i64
    }

    /// Seconds into the day containing this frame.
    #[must_use]
    pub fn frame_second(&self) -> u32 {
        self.seconds % SECONDS_PER_DAY as u32
    }

    /// Seconds since MJD 0 at the start of this frame.
    #[must_use]
    pub fn frame_mjd_sec(&self) -> u64 {
        self.epoch_mjd() as u64 * SECONDS_PER_DAY + u64::from(self.seconds)
    }

    /// Fractional MJD of the start of this frame.
    #[must_use]
    pub fn frame_dmjd(&self, frames_per_second: u32) -> f64 {
        let frac = if frames_per_second == 0 {
            0.0
        } else {
            f64::from(self.frame) / f64::from(frames_per_second)
        };
        self.frame_mjd() as f64 + (f64::from(self.frame_second()) + frac) / SECONDS_PER_DAY as f64
    }

    /// Set the seconds so the frame falls on `mjd`, keeping the second of the day.
    ///
    /// The epoch must already be set.
    ///
    /// # Errors
    /// [Error::Underflow] if `mjd` is before the epoch, [Error::Overflow] if it is too far
    /// after it.
    pub fn set_frame_mjd(&mut self, mjd: i64) -> Result<()> {
        let day_sec = i64::from(self.frame_second());
        self.set_seconds((mjd - self.epoch_mjd()) * SECONDS_PER_DAY as i64 + day_sec)
    }

    /// Set the seconds from seconds since MJD 0.
    ///
    /// # Errors
    /// See [Header::set_frame_mjd].
    pub fn set_frame_mjd_sec(&mut self, mjd_sec: u64) -> Result<()> {
        let epoch_sec = self.epoch_mjd() * SECONDS_PER_DAY as i64;
        let mjd_sec = i64::try_from(mjd_sec).map_err(|_| Error::Overflow)?;
        self.set_seconds(mjd_sec - epoch_sec)
    }

    /// Set the second within the current day.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if `second` is not within a day.
    pub fn set_frame_second(&mut self, second: u32) -> Result<()> {
        if u64::from(second) >= SECONDS_PER_DAY {
            return Err(Error::InvalidParameter(format!(
                "second of day must be less than {SECONDS_PER_DAY}; got {second}"
            )));
        }
        let day_start = self.frame_mjd_sec() - u64::from(self.frame_second());
        self.set_frame_mjd_sec(day_start + u64::from(second))
    }

    /// Set the epoch to the half year containing `mjd`.
    ///
    /// Frame seconds are not adjusted.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if the date is before 2000 or after the last half year the
    /// 6-bit epoch can represent.
    pub fn set_epoch_from_mjd(&mut self, mjd: i64) -> Result<()> {
        let (year, month, _) = ymd_from_mjd(mjd)
            .ok_or_else(|| Error::InvalidParameter(format!("invalid MJD {mjd}")))?;
        self.set_epoch(year, month)
    }

    /// Set the epoch to the half year containing `time`.
    ///
    /// # Errors
    /// See [Header::set_epoch_from_mjd].
    pub fn set_epoch_from_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.set_epoch(time.year(), time.month())
    }

    /// Set the seconds so the frame starts at `time`, truncated to the second.
    ///
    /// The epoch must already be set and the frame number is left alone.
    ///
    /// # Errors
    /// See [Header::set_frame_mjd].
    pub fn set_frame_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        let mjd_sec = time.timestamp() + UNIX_MJD * SECONDS_PER_DAY as i64;
        self.set_frame_mjd_sec(u64::try_from(mjd_sec).map_err(|_| Error::Underflow)?)
    }

    /// Time at the start of this frame, or `None` for a zero frame rate.
    #[must_use]
    pub fn time(&self, frames_per_second: u32) -> Option<DateTime<Utc>> {
        if frames_per_second == 0 {
            return None;
        }
        let secs = self.frame_mjd_sec() as i64 - UNIX_MJD * SECONDS_PER_DAY as i64;
        let nanos = u64::from(self.frame) * 1_000_000_000 / u64::from(frames_per_second);
        let secs = secs + (nanos / 1_000_000_000) as i64;
        Utc.timestamp_opt(secs, (nanos % 1_000_000_000) as u32).single()
    }

    /// Advance to the next frame, carrying into seconds at `frames_per_second`.
    ///
    /// # Errors
    /// [Error::Overflow] for the [FRAMES_PER_SECOND_SENTINEL] rate or when the seconds field
    /// would overflow, [Error::FrameOutOfRange] if the current frame number is not below
    /// `frames_per_second`.
    pub fn next_frame(&mut self, frames_per_second: u32) -> Result<()> {
        if frames_per_second == FRAMES_PER_SECOND_SENTINEL {
            return Err(Error::Overflow);
        }
        if self.frame >= frames_per_second {
            return Err(Error::FrameOutOfRange {
                frame: self.frame,
                frames_per_second,
            });
        }
        if self.frame + 1 == frames_per_second {
            if self.seconds >= SECONDS_MASK {
                return Err(Error::Overflow);
            }
            self.seconds += 1;
            self.frame = 0;
        } else {
            self.frame += 1;
        }
        Ok(())
    }

    /// Move by `frames` frames, forwards or backwards, carrying or borrowing seconds.
    ///
    /// # Errors
    /// [Error::FrameOutOfRange] for a zero frame rate, [Error::Underflow] if the result would
    /// precede the epoch, and [Error::Overflow] if it would not fit the seconds field.
    pub fn increment(&mut self, frames_per_second: u32, frames: i64) -> Result<()> {
        if frames_per_second == 0 {
            return Err(Error::FrameOutOfRange {
                frame: self.frame,
                frames_per_second,
            });
        }
        let fps = i64::from(frames_per_second);
        let total = i64::from(self.frame)
            .checked_add(frames)
            .ok_or(Error::Overflow)?;
        let seconds = i64::from(self.seconds) + total.div_euclid(fps);
        if seconds < 0 {
            return Err(Error::Underflow);
        }
        if seconds > i64::from(SECONDS_MASK) {
            return Err(Error::Overflow);
        }
        self.seconds = seconds as u32;
        self.frame = total.rem_euclid(fps) as u32;
        Ok(())
    }

    fn set_seconds(&mut self, seconds: i64) -> Result<()> {
        if seconds < 0 {
            return Err(Error::Underflow);
        }
        if seconds > i64::from(SECONDS_MASK) {
            return Err(Error::Overflow);
        }
        self.seconds = seconds as u32;
        Ok(())
    }

    fn set_epoch(&mut self, year: i32, month: u32) -> Result<()> {
        let epoch = (year - 2000) * 2 + i32::from(month > 6);
        if !(0..=63).contains(&epoch) {
            return Err(Error::InvalidParameter(format!(
                "{year}-{month:02} is outside the epochs a header can represent"
            )));
        }
        self.epoch = epoch as u8;
        Ok(())
    }
}
