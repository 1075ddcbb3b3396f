//! Procurement (CIG) dataset columns.

use super::{ColumnCatalog, ColumnRef, Dataset, NumericKind};

pub static PROCUREMENTS: ColumnCatalog = ColumnCatalog {
    dataset: Dataset::Procurements,
    table: "cig",
    key: "CIG",
    cost_column: "importo_complessivo_gara",
    all: ALL_COLUMNS,
    default_columns: DEFAULT_COLUMNS,
    filter_columns: FILTER_COLUMNS,
    search_columns: SEARCH_COLUMNS,
    numeric_columns: NUMERIC_COLUMNS,
};

/// Foreign key to the project dataset.
pub const PROCUREMENT_PROJECT_KEY: ColumnRef = ColumnRef::new("CUP", None);

/// Recovery-plan (PNRR/PNC) flag.
pub const PNRR_FLAG_COLUMN: ColumnRef = ColumnRef::new("flag_pnrr_pnc", Some(NumericKind::Integer));

/// Non-null only when the detail snapshot join matched.
pub const DETAIL_MARKER_COLUMN: ColumnRef = ColumnRef::new("oggetto_gara", None);

const DEFAULT_COLUMNS: &[&str] = &[
    "CIG",
    "CUP",
    "oggetto_gara",
    "importo_complessivo_gara",
    "stato_cig",
    "esito_cig",
    "tipo_scelta_contraente",
    "amm_appaltante",
    "data_pubblicazione",
    "provincia_cig",
    "anno_pubblicazione",
    "flag_pnrr_pnc",
];

const FILTER_COLUMNS: &[&str] = &[
    "stato_cig",
    "esito_cig",
    "settore_cig",
    "tipo_scelta_contraente",
    "anno_pubblicazione",
    "provincia_cig",
    "sezione_regionale",
    "modalita_realizzazione",
    "strumento_svolgimento",
    "criterio_aggiudicazione",
];

const SEARCH_COLUMNS: &[&str] = &["CIG", "CUP", "oggetto_gara", "amm_appaltante"];

const NUMERIC_COLUMNS: &[(&str, NumericKind)] = &[
    ("importo_complessivo_gara", NumericKind::Decimal),
    ("importo_lotto", NumericKind::Decimal),
    ("anno_pubblicazione", NumericKind::Integer),
    ("durata_prevista", NumericKind::Decimal),
    ("flag_pnrr_pnc", NumericKind::Integer),
    ("importo_aggiudicazione", NumericKind::Decimal),
    ("ribasso_aggiudicazione", NumericKind::Decimal),
    ("numero_offerte_ammesse", NumericKind::Integer),
    ("numero_offerte_escluse", NumericKind::Integer),
];

/// Columns sourced from the award-outcome archives.
///
/// Incremental enrichment replaces exactly this set.
pub const AWARD_COLUMNS: &[&str] = &[
    "id_aggiudicazione",
    "importo_aggiudicazione",
    "criterio_aggiudicazione",
    "ribasso_aggiudicazione",
    "numero_offerte_ammesse",
    "numero_offerte_escluse",
    "flag_subappalto",
    "asta_elettronica",
    "data_aggiudicazione_definitiva",
];

const ALL_COLUMNS: &[&str] = &[
    "CIG",
    "CUP",
    "oggetto_gara",
    "importo_complessivo_gara",
    "importo_lotto",
    "oggetto_lotto",
    "stato_cig",
    "settore_cig",
    "tipo_scelta_contraente",
    "amm_appaltante",
    "data_pubblicazione",
    "data_scadenza_offerta",
    "descrizione_cpv",
    "esito_cig",
    "provincia_cig",
    "anno_pubblicazione",
    "modalita_realizzazione",
    "sezione_regionale",
    "strumento_svolgimento",
    "durata_prevista",
    "numero_gara",
    "cf_amm_appaltante",
    "flag_pnrr_pnc",
    "oggetto_principale_contratto",
    "data_ultimo_perfezionamento",
    "data_comunicazione_esito",
    "id_aggiudicazione",
    "importo_aggiudicazione",
    "criterio_aggiudicazione",
    "ribasso_aggiudicazione",
    "numero_offerte_ammesse",
    "numero_offerte_escluse",
    "flag_subappalto",
    "asta_elettronica",
    "data_aggiudicazione_definitiva",
];

/// Detail columns and the raw snapshot field each one is read from.
///
/// Raw field names are lower-cased at read time.
pub const DETAIL_FIELDS: &[(&str, &str)] = &[
    ("oggetto_gara", "oggetto_gara"),
    ("importo_complessivo_gara", "importo_complessivo_gara"),
    ("importo_lotto", "importo_lotto"),
    ("oggetto_lotto", "oggetto_lotto"),
    ("stato_cig", "stato"),
    ("settore_cig", "settore"),
    ("tipo_scelta_contraente", "tipo_scelta_contraente"),
    ("amm_appaltante", "denominazione_amministrazione_appaltante"),
    ("data_pubblicazione", "data_pubblicazione"),
    ("data_scadenza_offerta", "data_scadenza_offerta"),
    ("descrizione_cpv", "descrizione_cpv"),
    ("esito_cig", "esito"),
    ("provincia_cig", "provincia"),
    ("anno_pubblicazione", "anno_pubblicazione"),
    ("modalita_realizzazione", "modalita_realizzazione"),
    ("sezione_regionale", "sezione_regionale"),
    ("strumento_svolgimento", "strumento_svolgimento"),
    ("durata_prevista", "durata_prevista"),
    ("numero_gara", "numero_gara"),
    ("cf_amm_appaltante", "cf_amministrazione_appaltante"),
    ("flag_pnrr_pnc", "flag_pnrr_pnc"),
    ("oggetto_principale_contratto", "oggetto_principale_contratto"),
    ("data_ultimo_perfezionamento", "data_ultimo_perfezionamento"),
    ("data_comunicazione_esito", "data_comunicazione_esito"),
];
