// SPDX-License-Identifier: Apache-2.0

use crate::normalize::{normalize_district_text, normalize_state_text};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug)]
pub struct TablesError(pub String);

impl Display for TablesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TablesError {}

const VALID_STATES: [&str; 36] = [
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
    "Andaman and Nicobar Islands",
    "Chandigarh",
    "Dadra and Nagar Haveli and Daman and Diu",
    "Delhi",
    "Jammu and Kashmir",
    "Ladakh",
    "Lakshadweep",
    "Puducherry",
];

// Spelling variants and abbreviations seen in the published files. Proper
// names of the valid states are added on top of these.
const STATE_VARIANTS: &[(&str, &str)] = &[
    ("orissa", "Odisha"),
    ("tamilnadu", "Tamil Nadu"),
    ("uttaranchal", "Uttarakhand"),
    ("westbengal", "West Bengal"),
    ("west bangal", "West Bengal"),
    ("wb", "West Bengal"),
    ("up", "Uttar Pradesh"),
    ("tn", "Tamil Nadu"),
    ("mp", "Madhya Pradesh"),
    ("chattisgarh", "Chhattisgarh"),
    ("hyd", "Telangana"),
    ("hyderabad", "Telangana"),
    ("andaman nicobar islands", "Andaman and Nicobar Islands"),
    ("andaman & nicobar islands", "Andaman and Nicobar Islands"),
    ("a & n islands", "Andaman and Nicobar Islands"),
    ("dadra nagar haveli", "Dadra and Nagar Haveli and Daman and Diu"),
    ("dadra and nagar haveli", "Dadra and Nagar Haveli and Daman and Diu"),
    ("dadra & nagar haveli", "Dadra and Nagar Haveli and Daman and Diu"),
    ("daman and diu", "Dadra and Nagar Haveli and Daman and Diu"),
    ("daman diu", "Dadra and Nagar Haveli and Daman and Diu"),
    ("dnh & dd", "Dadra and Nagar Haveli and Daman and Diu"),
    ("new delhi", "Delhi"),
    ("nct of delhi", "Delhi"),
    ("jammu kashmir", "Jammu and Kashmir"),
    ("jammu & kashmir", "Jammu and Kashmir"),
    ("j & k", "Jammu and Kashmir"),
    ("pondicherry", "Puducherry"),
];

// District renames and spellings; keys are compared after district cleaning.
const DISTRICT_ALIASES: &[(&str, &str)] = &[
    ("belagavi", "Belagavi"),
    ("belgaum", "Belagavi"),
    ("bengaluru", "Bengaluru"),
    ("bangalore", "Bengaluru"),
    ("bengaluru urban", "Bengaluru Urban"),
    ("bangalore urban", "Bengaluru Urban"),
    ("bengaluru rural", "Bengaluru Rural"),
    ("bangalore rural", "Bengaluru Rural"),
    ("kalaburagi", "Kalaburagi"),
    ("gulbarga", "Kalaburagi"),
    ("mysuru", "Mysuru"),
    ("mysore", "Mysuru"),
    ("shivamogga", "Shivamogga"),
    ("shimoga", "Shivamogga"),
    ("vijayapura", "Vijayapura"),
    ("bijapur", "Vijayapura"),
    ("ballari", "Ballari"),
    ("bellary", "Ballari"),
    ("chikkamagaluru", "Chikkamagaluru"),
    ("chikmagalur", "Chikkamagaluru"),
    ("chamarajanagara", "Chamarajanagara"),
    ("chamrajanagar", "Chamarajanagara"),
    ("mangalore", "Dakshina Kannada"),
    ("dakshina kannada", "Dakshina Kannada"),
    ("davanagere", "Davangere"),
    ("davangere", "Davangere"),
    ("hubli", "Dharwad"),
    ("hubballi", "Dharwad"),
    ("hasan", "Hassan"),
    ("ramanagar", "Ramanagara"),
    ("ahmednagar", "Ahilyanagar"),
    ("ahmed nagar", "Ahilyanagar"),
    ("aurangabad", "Chhatrapati Sambhajinagar"),
    ("osmanabad", "Dharashiv"),
    ("beed", "Bid"),
    ("buldhana", "Buldana"),
    ("gondia", "Gondiya"),
    ("raigarh(mh)", "Raigad"),
    ("raigarh", "Raigad"),
    ("bombay", "Mumbai"),
    ("mumbai suburban", "Mumbai Suburban"),
    ("mumbai", "Mumbai"),
    ("jalgaon", "Jalgaon"),
    ("ferozepur", "Firozpur"),
    ("s.a.s nagar", "S.A.S. Nagar"),
    ("mohali", "S.A.S. Nagar"),
    ("sas nagar mohali", "S.A.S. Nagar"),
    ("s.a.s nagar (mohali)", "S.A.S. Nagar"),
    ("s.a.s. nagar", "S.A.S. Nagar"),
    ("muktsar", "Sri Muktsar Sahib"),
    ("burdwan", "Purba Bardhaman"),
    ("bardhaman", "Purba Bardhaman"),
    ("coochbehar", "Cooch Behar"),
    ("darjiling", "Darjeeling"),
    ("hooghly", "Hooghly"),
    ("howrah", "Howrah"),
    ("north 24 parganas", "North 24 Parganas"),
    ("north twenty four parganas", "North 24 Parganas"),
    ("south 24 parganas", "South 24 Parganas"),
    ("south twenty four parganas", "South 24 Parganas"),
    ("24 paraganas south", "South 24 Parganas"),
    ("puruliya", "Purulia"),
    ("malda", "Maldah"),
    ("baramulla", "Baramula"),
    ("bandipora", "Bandipore"),
    ("budgam", "Badgam"),
    ("shupiyan", "Shopian"),
    ("punch", "Poonch"),
    ("leh", "Leh"),
    ("ladakh", "Leh"),
    ("rajauri", "Rajouri"),
    ("janjgir-champa", "Janjgir-Champa"),
    ("janjgir champa", "Janjgir-Champa"),
    ("kabeerdham", "Kabirdham"),
    ("koriya", "Korea"),
    ("mohla-manpur-ambagarh chouki", "Mohla-Manpur-Ambagarh Chowki"),
    ("mohla manpur ambagarh chouki", "Mohla-Manpur-Ambagarh Chowki"),
    ("mohalla-manpur-ambagarh chouki", "Mohla-Manpur-Ambagarh Chowki"),
    ("gaurela-pendra-marwahi", "Gaurella Pendra Marwahi"),
    ("gaurela pendra marwahi", "Gaurella Pendra Marwahi"),
    ("sarangarh-bilaigarh", "Sarangarh Bilaigarh"),
    ("kadapa", "Y.S.R. Kadapa"),
    ("y.s.r. kadapa", "Y.S.R. Kadapa"),
    ("y s r kadapa", "Y.S.R. Kadapa"),
    ("ysr district", "Y.S.R. Kadapa"),
    ("mahbubnagar", "Mahabubnagar"),
    ("warangal urban", "Hanumakonda"),
    ("dr. b. r. ambedkar konaseema", "Dr. B.R. Ambedkar Konaseema"),
    ("dr b r ambedkar konaseema", "Dr. B.R. Ambedkar Konaseema"),
    ("n. t. r", "NTR"),
    ("n.t.r", "NTR"),
    ("sri potti sriramulu nellore", "Nellore"),
    ("yadadri", "Yadadri"),
    ("yadadri.", "Yadadri"),
    ("medchal malkajgiri", "Medchal-Malkajgiri"),
    ("kancheepuram", "Kanchipuram"),
    ("thiruvallur", "Tiruvallur"),
    ("thoothukudi", "Thoothukkudi"),
    ("tuticorin", "Thoothukkudi"),
    ("kanyakumari", "Kanniyakumari"),
    ("villupuram", "Viluppuram"),
    ("thiruvarur", "Tiruvarur"),
    ("tirupathur", "Tirupattur"),
    ("allahabad", "Prayagraj"),
    ("faizabad", "Ayodhya"),
    ("lakhimpur kheri", "Kheri"),
    ("sant ravidas nagar", "Bhadohi"),
    ("sant ravidas nagar bhadohi", "Bhadohi"),
    ("bara banki", "Barabanki"),
    ("bulandshahar", "Bulandshahr"),
    ("baghpat", "Bagpat"),
    ("shravasti", "Shrawasti"),
    ("maharajganj", "Mahrajganj"),
    ("baleswar", "Balasore"),
    ("keonjhar", "Kendujhar"),
    ("nabarangapur", "Nabarangpur"),
    ("jagatsinghapur", "Jagatsinghpur"),
    ("anugul", "Angul"),
    ("baudh", "Boudh"),
    ("subarnapur", "Sonepur"),
    ("sonapur", "Sonepur"),
    ("jajapur", "Jajpur"),
    ("khorda", "Khordha"),
    ("sundargarh", "Sundergarh"),
    ("kaimur (bhabua)", "Kaimur"),
    ("kaimur bhabua", "Kaimur"),
    ("bhabua", "Kaimur"),
    ("purbi champaran", "East Champaran"),
    ("paschim champaran", "West Champaran"),
    ("jehanabad", "Jehanabad"),
    ("monghyr", "Munger"),
    ("sheikhpura", "Sheikpura"),
    ("samstipur", "Samastipur"),
    ("samastipur", "Samastipur"),
    ("ahmadabad", "Ahmedabad"),
    ("dohad", "Dahod"),
    ("mahesana", "Mehsana"),
    ("panchmahals", "Panchmahal"),
    ("banaskantha", "Banaskantha"),
    ("sabarkantha", "Sabarkantha"),
    ("surendra nagar", "Surendranagar"),
    ("gurgaon", "Gurugram"),
    ("mewat", "Nuh"),
    ("yamuna nagar", "Yamunanagar"),
    ("palamau", "Palamu"),
    ("pashchimi singhbhum", "West Singhbhum"),
    ("purbi singhbhum", "East Singhbhum"),
    ("saraikela-kharsawan", "Seraikela Kharsawan"),
    ("seraikela-kharsawan", "Seraikela Kharsawan"),
    ("hazaribag", "Hazaribagh"),
    ("kodarma", "Koderma"),
    ("pakaur", "Pakur"),
    ("sahebganj", "Sahibganj"),
    ("simdega", "Simdega"),
    ("lohardaga", "Lohardaga"),
    ("narsimhapur", "Narsinghpur"),
    ("hoshangabad", "Narmadapuram"),
    ("ashok nagar", "Ashoknagar"),
    ("kamrup metro", "Kamrup Metropolitan"),
    ("south salmara mankachar", "South Salmara-Mankachar"),
    ("ri-bhoi", "Ri Bhoi"),
    ("mamit", "Mammit"),
    ("chittaurgarh", "Chittorgarh"),
    ("jalor", "Jalore"),
    ("jhunjhunu", "Jhunjhunun"),
    ("didwana-kuchaman", "Didwana Kuchaman"),
    ("khairthal-tijara", "Khairthal Tijara"),
    ("kotputli-behror", "Kotputli Behror"),
    ("lahaul and spiti", "Lahul and Spiti"),
    ("shi yomi", "Shi Yomi"),
    ("shi-yomi", "Shi Yomi"),
    ("nicobar", "Nicobars"),
    ("kasaragod", "Kasargod"),
];

/// Files the optional tables are read from. `None` means the table is absent.
#[derive(Debug, Clone, Default)]
pub struct TablePaths {
    pub pincode_map: Option<PathBuf>,
    pub district_aliases: Option<PathBuf>,
}

/// Process-wide lookup tables used to canonicalize states and districts.
///
/// Built once at startup and shared read-only between aggregation runs.
#[derive(Debug, Clone)]
pub struct NormalizationTables {
    canonical_states: HashMap<String, String>,
    valid_states: BTreeSet<String>,
    pincode_states: HashMap<String, String>,
    district_aliases: HashMap<String, String>,
}

impl NormalizationTables {
    /// Compiled-in state and district tables with an empty pincode map.
    #[must_use]
    pub fn builtin() -> Self {
        let valid_states: BTreeSet<String> =
            VALID_STATES.iter().map(|s| (*s).to_string()).collect();
        let mut canonical_states = HashMap::new();
        for state in &valid_states {
            canonical_states.insert(normalize_state_text(state), state.clone());
        }
        for (variant, state) in STATE_VARIANTS {
            canonical_states.insert(normalize_state_text(variant), state.to_string());
        }
        let tables = Self {
            canonical_states,
            valid_states,
            pincode_states: HashMap::new(),
            district_aliases: HashMap::new(),
        };
        tables.with_district_aliases(
            DISTRICT_ALIASES
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        )
    }

    /// Builtin tables plus whatever optional files exist. A missing or
    /// unreadable file leaves the corresponding table empty.
    #[must_use]
    pub fn load(paths: &TablePaths) -> Self {
        let mut tables = Self::builtin();
        if let Some(path) = &paths.pincode_map {
            match load_json_map(path) {
                Ok(map) => {
                    info!(path = %path.display(), entries = map.len(), "loaded pincode map");
                    tables = tables.with_pincode_map(map);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "pincode map unavailable"),
            }
        }
        if let Some(path) = &paths.district_aliases {
            match load_json_map(path) {
                Ok(map) => {
                    info!(path = %path.display(), entries = map.len(), "loaded district aliases");
                    tables = tables.with_district_aliases(map);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "district aliases unavailable"),
            }
        }
        tables
    }

    #[must_use]
    pub fn with_pincode_map(mut self, map: impl IntoIterator<Item = (String, String)>) -> Self {
        for (pincode, state) in map {
            self.pincode_states
                .insert(pincode.trim().to_string(), state.trim().to_string());
        }
        self
    }

    #[must_use]
    pub fn with_district_aliases(
        mut self,
        aliases: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        for (alias, canonical) in aliases {
            let key = normalize_district_text(&alias).to_lowercase();
            self.district_aliases.insert(key, canonical.trim().to_string());
        }
        self
    }

    #[must_use]
    pub fn canonical_state(&self, cleaned: &str) -> Option<&str> {
        self.canonical_states.get(cleaned).map(String::as_str)
    }

    #[must_use]
    pub fn state_for_pincode(&self, pincode: &str) -> Option<&str> {
        self.pincode_states.get(pincode).map(String::as_str)
    }

    #[must_use]
    pub fn district_alias(&self, cleaned_lower: &str) -> Option<&str> {
        self.district_aliases.get(cleaned_lower).map(String::as_str)
    }

    #[must_use]
    pub fn is_valid_state(&self, state: &str) -> bool {
        self.valid_states.contains(state)
    }

    #[must_use]
    pub fn valid_states(&self) -> &BTreeSet<String> {
        &self.valid_states
    }
}

impl Default for NormalizationTables {
    fn default() -> Self {
        Self::builtin()
    }
}

fn load_json_map(path: &Path) -> Result<HashMap<String, String>, TablesError> {
    let raw = std::fs::read(path).map_err(|e| TablesError(format!("read failed: {e}")))?;
    let value: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|e| TablesError(format!("parse failed: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| TablesError("expected a JSON object".to_string()))?;
    let mut out = HashMap::with_capacity(object.len());
    for (k, v) in object {
        // Pincode dumps sometimes carry numeric or null values; skip them.
        if let Some(s) = v.as_str() {
            out.insert(k.clone(), s.to_string());
        }
    }
    Ok(out)
}
