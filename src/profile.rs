//! Thermal profiles: an ordered list of (time offset, temperature, flags)
//! waypoints.
//!
//! Binary layout (little endian): one count byte, then `count` records of
//! `i32` seconds, `f32` temperature and one flag byte.
//!
//! Authoring text layout: first line is the count, each following line is
//! `seconds,temperature,flags`.

use core::fmt;
use embassy_time::Duration;
use heapless::{String, Vec};

pub const MAX_DATAPOINTS: usize = 64;
pub const RECORD_SIZE: usize = 9;
pub const MAX_ENCODED_SIZE: usize = 1 + MAX_DATAPOINTS * RECORD_SIZE;
pub const MAX_NAME_LEN: usize = 32;
/// Records store offsets as signed 32-bit seconds.
pub const MAX_TIME_OFFSET: u32 = i32::MAX as u32;

bitflags::bitflags! {
    /// Per-datapoint behaviour flags, as stored in the flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DatapointFlags: u8 {
        /// Interpolate from the previous datapoint's temperature.
        const LERP_FROM                = 0b0000_0001;
        /// The door may be open while this datapoint is active.
        const NO_ABORT_DOOR_OPEN       = 0b0000_0010;
        /// Hold the profile clock until the oven reaches the target.
        const WAIT_FOR_TEMPERATURE     = 0b0000_0100;
        /// Beep once when this datapoint becomes active.
        const BEEP                     = 0b0000_1000;
        /// Hold the clock until the door has been opened once.
        const INSERT_ITEM_NOTIFICATION = 0b0001_0000;
        /// Cooling segment: fan on, door may open.
        const COOLING                  = 0b0010_0000;
        /// Control on the next datapoint's temperature.
        const NEXT_TEMPERATURE         = 0b0100_0000;
    }
}

/// The gates that clear themselves once satisfied during a run.
pub const ONE_SHOT_GATES: DatapointFlags = DatapointFlags::WAIT_FOR_TEMPERATURE
    .union(DatapointFlags::INSERT_ITEM_NOTIFICATION)
    .union(DatapointFlags::NO_ABORT_DOOR_OPEN);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileDatapoint {
    /// Whole seconds since profile start.
    pub time_offset: u32,
    pub temperature: f32,
    pub flags: DatapointFlags,
}

impl ProfileDatapoint {
    pub const fn new(time_offset: u32, temperature: f32, flags: DatapointFlags) -> Self {
        Self {
            time_offset,
            temperature,
            flags,
        }
    }

    pub fn offset(&self) -> Duration {
        Duration::from_secs(self.time_offset as u64)
    }

    fn write_record(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&(self.time_offset as i32).to_le_bytes());
        out[4..8].copy_from_slice(&self.temperature.to_le_bytes());
        out[8] = self.flags.bits();
    }

    fn read_record(record: &[u8]) -> Result<Self, ProfileError> {
        let seconds = i32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let temperature = f32::from_le_bytes([record[4], record[5], record[6], record[7]]);
        if seconds < 0 {
            return Err(ProfileError::NegativeOffset);
        }
        if !temperature.is_finite() {
            return Err(ProfileError::InvalidTemperature);
        }
        Ok(Self {
            time_offset: seconds as u32,
            temperature,
            // Unknown bits are dropped rather than rejected.
            flags: DatapointFlags::from_bits_truncate(record[8]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileError {
    Empty,
    TooManyDatapoints,
    Truncated,
    BufferTooSmall,
    NegativeOffset,
    /// Offset does not fit the signed 32-bit field of the binary record.
    OffsetOutOfRange,
    OutOfOrder,
    InvalidTemperature,
    ParseError,
    CountMismatch,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::Empty => write!(f, "Profile has no datapoints"),
            ProfileError::TooManyDatapoints => write!(f, "Too many datapoints"),
            ProfileError::Truncated => write!(f, "Profile data truncated"),
            ProfileError::BufferTooSmall => write!(f, "Output buffer too small"),
            ProfileError::NegativeOffset => write!(f, "Negative time offset"),
            ProfileError::OffsetOutOfRange => write!(f, "Time offset out of range"),
            ProfileError::OutOfOrder => write!(f, "Datapoints out of time order"),
            ProfileError::InvalidTemperature => write!(f, "Invalid temperature"),
            ProfileError::ParseError => write!(f, "Profile parse error"),
            ProfileError::CountMismatch => write!(f, "Datapoint count mismatch"),
        }
    }
}

#[cfg(feature = "rp2040")]
impl defmt::Format for ProfileError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.to_str())
    }
}

impl ProfileError {
    pub fn to_str(&self) -> &'static str {
        match self {
            ProfileError::Empty => "empty",
            ProfileError::TooManyDatapoints => "too many datapoints",
            ProfileError::Truncated => "truncated",
            ProfileError::BufferTooSmall => "buffer too small",
            ProfileError::NegativeOffset => "negative offset",
            ProfileError::OffsetOutOfRange => "offset out of range",
            ProfileError::OutOfOrder => "out of order",
            ProfileError::InvalidTemperature => "invalid temperature",
            ProfileError::ParseError => "parse error",
            ProfileError::CountMismatch => "count mismatch",
        }
    }
}

/// A validated, immutable profile definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String<MAX_NAME_LEN>,
    datapoints: Vec<ProfileDatapoint, MAX_DATAPOINTS>,
}

impl Profile {
    /// Build a profile, checking that it is non-empty and ordered by time.
    /// Equal consecutive offsets are allowed and act as an immediate step.
    pub fn new(name: &str, datapoints: &[ProfileDatapoint]) -> Result<Self, ProfileError> {
        if datapoints.is_empty() {
            return Err(ProfileError::Empty);
        }
        let datapoints =
            Vec::from_slice(datapoints).map_err(|_| ProfileError::TooManyDatapoints)?;

        let mut previous = 0u32;
        for point in datapoints.iter() {
            if point.time_offset > MAX_TIME_OFFSET {
                return Err(ProfileError::OffsetOutOfRange);
            }
            if point.time_offset < previous {
                return Err(ProfileError::OutOfOrder);
            }
            if !point.temperature.is_finite() {
                return Err(ProfileError::InvalidTemperature);
            }
            previous = point.time_offset;
        }

        Ok(Self {
            name: truncated_name(name),
            datapoints,
        })
    }

    pub fn datapoints(&self) -> &[ProfileDatapoint] {
        &self.datapoints
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProfileDatapoint> {
        self.datapoints.get(index)
    }

    /// Offset of the last datapoint.
    pub fn total_duration(&self) -> Duration {
        self.datapoints
            .last()
            .map(ProfileDatapoint::offset)
            .unwrap_or(Duration::from_secs(0))
    }

    pub fn encoded_len(&self) -> usize {
        1 + self.datapoints.len() * RECORD_SIZE
    }

    /// Write the binary form into `out`, returning the number of bytes used.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProfileError> {
        let len = self.encoded_len();
        if out.len() < len {
            return Err(ProfileError::BufferTooSmall);
        }

        out[0] = self.datapoints.len() as u8;
        for (point, record) in self
            .datapoints
            .iter()
            .zip(out[1..len].chunks_exact_mut(RECORD_SIZE))
        {
            point.write_record(record);
        }
        Ok(len)
    }

    /// Decode the binary form. Trailing bytes past the last record are
    /// ignored.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self, ProfileError> {
        let (&count, body) = bytes.split_first().ok_or(ProfileError::Truncated)?;
        let count = count as usize;
        if count > MAX_DATAPOINTS {
            return Err(ProfileError::TooManyDatapoints);
        }
        if body.len() < count * RECORD_SIZE {
            return Err(ProfileError::Truncated);
        }

        let mut points: Vec<ProfileDatapoint, MAX_DATAPOINTS> = Vec::new();
        for record in body[..count * RECORD_SIZE].chunks_exact(RECORD_SIZE) {
            let _ = points.push(ProfileDatapoint::read_record(record)?);
        }
        Self::new(name, &points)
    }

    /// Parse the authoring text form.
    pub fn parse_text(name: &str, text: &str) -> Result<Self, ProfileError> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let count: usize = lines
            .next()
            .ok_or(ProfileError::Empty)?
            .parse()
            .map_err(|_| ProfileError::ParseError)?;
        if count > MAX_DATAPOINTS {
            return Err(ProfileError::TooManyDatapoints);
        }

        let mut points: Vec<ProfileDatapoint, MAX_DATAPOINTS> = Vec::new();
        for line in lines.take(count) {
            let mut fields = line.split(',').map(str::trim);
            let seconds: i32 = parse_field(fields.next())?;
            let temperature: f32 = parse_field(fields.next())?;
            let flags: u8 = parse_field(fields.next())?;
            if seconds < 0 {
                return Err(ProfileError::NegativeOffset);
            }
            let _ = points.push(ProfileDatapoint::new(
                seconds as u32,
                temperature,
                DatapointFlags::from_bits_truncate(flags),
            ));
        }

        if points.len() != count {
            return Err(ProfileError::CountMismatch);
        }
        Self::new(name, &points)
    }
}

fn parse_field<T: core::str::FromStr>(field: Option<&str>) -> Result<T, ProfileError> {
    field
        .ok_or(ProfileError::ParseError)?
        .parse()
        .map_err(|_| ProfileError::ParseError)
}

fn truncated_name(name: &str) -> String<MAX_NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Built-in lead-free (SAC305) profile, in authoring text form.
pub const LEAD_FREE_TEXT: &str = "\
7
0,150,4
90,150,0
180,180,1
210,217,77
240,245,1
270,217,1
330,50,34
";

/// Built-in tin-lead profile, in authoring text form.
pub const LEADED_TEXT: &str = "\
6
0,100,4
180,150,1
270,183,1
300,215,9
330,183,1
390,50,34
";

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn built_in_profiles_parse() {
        let lead_free = Profile::parse_text("Lead Free", LEAD_FREE_TEXT).unwrap();
        assert_eq!(lead_free.len(), 7);
        assert_eq!(lead_free.total_duration(), Duration::from_secs(330));
        assert!(lead_free.datapoints()[3]
            .flags
            .contains(DatapointFlags::NEXT_TEMPERATURE | DatapointFlags::BEEP));
        assert!(lead_free.datapoints()[6].flags.contains(DatapointFlags::COOLING));

        let leaded = Profile::parse_text("Leaded", LEADED_TEXT).unwrap();
        assert_eq!(leaded.len(), 6);
    }

    #[test]
    fn binary_layout_matches_record_format() {
        let profile = Profile::new(
            "t",
            &[ProfileDatapoint::new(
                300,
                217.5,
                DatapointFlags::LERP_FROM | DatapointFlags::BEEP,
            )],
        )
        .unwrap();
        let mut buf = [0u8; 16];
        let len = profile.encode(&mut buf).unwrap();
        assert_eq!(len, 10);
        assert_eq!(buf[0], 1);
        assert_eq!(&buf[1..5], &300i32.to_le_bytes());
        assert_eq!(&buf[5..9], &217.5f32.to_le_bytes());
        assert_eq!(buf[9], 0b1001);
    }

    #[rstest]
    #[case("", ProfileError::Empty)]
    #[case("0\n", ProfileError::Empty)]
    #[case("x\n", ProfileError::ParseError)]
    #[case("2\n0,25,0\n", ProfileError::CountMismatch)]
    #[case("1\n0,hot,0\n", ProfileError::ParseError)]
    #[case("1\n0,25\n", ProfileError::ParseError)]
    #[case("1\n-5,25,0\n", ProfileError::NegativeOffset)]
    #[case("2\n60,25,0\n30,100,0\n", ProfileError::OutOfOrder)]
    #[case("65\n", ProfileError::TooManyDatapoints)]
    fn rejects_malformed_text(#[case] text: &str, #[case] expected: ProfileError) {
        assert_eq!(Profile::parse_text("bad", text), Err(expected));
    }

    #[test]
    fn decode_rejects_truncated_and_negative_records() {
        assert_eq!(Profile::decode("t", &[]), Err(ProfileError::Truncated));
        assert_eq!(Profile::decode("t", &[2, 0, 0]), Err(ProfileError::Truncated));

        let mut buf = [0u8; 10];
        buf[0] = 1;
        buf[1..5].copy_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(Profile::decode("t", &buf), Err(ProfileError::NegativeOffset));
    }

    #[test]
    fn offsets_must_fit_the_record_field() {
        let last = Profile::new(
            "t",
            &[ProfileDatapoint::new(MAX_TIME_OFFSET, 25.0, DatapointFlags::empty())],
        )
        .unwrap();
        let mut buf = [0u8; 16];
        let len = last.encode(&mut buf).unwrap();
        assert_eq!(Profile::decode("t", &buf[..len]).unwrap(), last);

        for offset in [MAX_TIME_OFFSET + 1, 3_000_000_000] {
            assert_eq!(
                Profile::new("t", &[ProfileDatapoint::new(offset, 25.0, DatapointFlags::empty())]),
                Err(ProfileError::OffsetOutOfRange)
            );
        }
    }

    #[test]
    fn encode_needs_room() {
        let profile = Profile::parse_text("t", "1\n0,25,0").unwrap();
        let mut buf = [0u8; 9];
        assert_eq!(profile.encode(&mut buf), Err(ProfileError::BufferTooSmall));
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "a profile name that is far longer than thirty-two bytes";
        let profile = Profile::parse_text(name, "1\n0,25,0").unwrap();
        assert_eq!(profile.name.len(), MAX_NAME_LEN);
    }

    fn datapoints() -> impl Strategy<Value = std::vec::Vec<ProfileDatapoint>> {
        proptest::collection::vec((0u32..600, -40.0f32..400.0, any::<u8>()), 1..MAX_DATAPOINTS)
            .prop_map(|raw| {
                let mut offset = 0;
                raw.into_iter()
                    .map(|(step, temperature, bits)| {
                        offset += step;
                        ProfileDatapoint::new(
                            offset,
                            temperature,
                            DatapointFlags::from_bits_truncate(bits),
                        )
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn binary_round_trip_preserves_datapoints(points in datapoints()) {
            let profile = Profile::new("p", &points).unwrap();
            let mut buf = [0u8; MAX_ENCODED_SIZE];
            let len = profile.encode(&mut buf).unwrap();
            prop_assert_eq!(len, 1 + points.len() * RECORD_SIZE);
            let decoded = Profile::decode("p", &buf[..len]).unwrap();
            prop_assert_eq!(decoded.datapoints(), &points[..]);
        }
    }
}
