use crate::allocator::error::AllocatorError;
use crate::grid::coordinate::GridCoordinate;

const FIELD_SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Assign,
    Orphan,
    CursorAdvance,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Assign => "ASSIGN",
            TransitionKind::Orphan => "ORPHAN",
            TransitionKind::CursorAdvance => "CURSOR_ADVANCE",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "ASSIGN" => Some(TransitionKind::Assign),
            "ORPHAN" => Some(TransitionKind::Orphan),
            "CURSOR_ADVANCE" => Some(TransitionKind::CursorAdvance),
            _ => None,
        }
    }
}

/// One immutable line of the reservation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationLogEntry {
    pub timestamp_ms: u64,
    pub coordinate: GridCoordinate,
    pub kind: TransitionKind,
    /// Only set for `Assign`, and even then optional.
    pub owner: Option<String>,
}

impl AllocationLogEntry {
    pub fn assign(coordinate: GridCoordinate, owner: Option<String>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            coordinate,
            kind: TransitionKind::Assign,
            owner: owner.filter(|owner| !owner.is_empty()),
        }
    }

    pub fn orphan(coordinate: GridCoordinate, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            coordinate,
            kind: TransitionKind::Orphan,
            owner: None,
        }
    }

    pub fn cursor_advance(coordinate: GridCoordinate, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            coordinate,
            kind: TransitionKind::CursorAdvance,
            owner: None,
        }
    }

    /// `epoch_ms;x;z;KIND;owner`, without the trailing newline.
    pub fn to_line(&self) -> String {
        let owner = match (self.kind, self.owner.as_deref()) {
            (TransitionKind::Assign, Some(owner)) => escape_owner(owner),
            _ => String::new(),
        };
        format!(
            "{ts}{sep}{x}{sep}{z}{sep}{kind}{sep}{owner}",
            ts = self.timestamp_ms,
            x = self.coordinate.x,
            z = self.coordinate.z,
            kind = self.kind.as_str(),
            owner = owner,
            sep = FIELD_SEPARATOR,
        )
    }

    pub fn parse_line(line: &str, line_no: usize) -> Result<Self, AllocatorError> {
        let corrupt = |reason: String| AllocatorError::CorruptLogEntry {
            line: line_no,
            reason,
        };
        let mut fields = line.splitn(5, FIELD_SEPARATOR);
        let timestamp_ms = fields
            .next()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| corrupt("missing or invalid timestamp".to_string()))?;
        let x = parse_axis(fields.next(), "x").map_err(corrupt)?;
        let z = parse_axis(fields.next(), "z").map_err(corrupt)?;
        let kind_field = fields
            .next()
            .ok_or_else(|| corrupt("missing transition kind".to_string()))?;
        let kind = TransitionKind::parse(kind_field.trim())
            .ok_or_else(|| corrupt(format!("unknown transition kind '{}'", kind_field)))?;
        let owner_field = fields
            .next()
            .ok_or_else(|| corrupt("missing owner field".to_string()))?;
        let owner = if owner_field.is_empty() {
            None
        } else {
            if kind != TransitionKind::Assign {
                return Err(corrupt(format!("{} entry carries an owner", kind.as_str())));
            }
            Some(unescape_owner(owner_field).map_err(corrupt)?)
        };
        Ok(Self {
            timestamp_ms,
            coordinate: GridCoordinate::new(x, z),
            kind,
            owner,
        })
    }
}

fn parse_axis(value: Option<&str>, label: &str) -> Result<i32, String> {
    let value = value.ok_or_else(|| format!("missing {} coordinate", label))?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("{} coordinate is not an integer: '{}'", label, value))
}

fn escape_owner(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace(';', "\\s")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape_owner(input: &str) -> Result<String, String> {
    let mut output = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch == FIELD_SEPARATOR {
            return Err("owner contains an unescaped separator".to_string());
        }
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            return Err("owner escape sequence truncated".to_string());
        };
        match next {
            's' => output.push(';'),
            'n' => output.push('\n'),
            'r' => output.push('\r'),
            '\\' => output.push('\\'),
            other => return Err(format!("owner has unknown escape '\\{}'", other)),
        }
    }
    Ok(output)
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
