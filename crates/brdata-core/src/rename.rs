// Source-dictionary to canonical column names
//
// Each published dataset ships its own column dictionary. The tables below
// are fixed at compile time; nothing is renamed ad hoc at runtime.

/// Fixed source→canonical column dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenameTable {
    name: &'static str,
    entries: &'static [(&'static str, &'static str)],
}

impl RenameTable {
    pub const fn new(name: &'static str, entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { name, entries }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Canonical name for a source column, if the dictionary knows it.
    pub fn lookup(&self, source: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(from, _)| *from == source)
            .map(|(_, to)| *to)
    }

    /// Rename a header row. Unknown columns keep their source name.
    pub fn rename_header<S: AsRef<str>>(&self, header: &[S]) -> Vec<String> {
        header
            .iter()
            .map(|col| {
                let col = col.as_ref();
                self.lookup(col).unwrap_or(col).to_string()
            })
            .collect()
    }

    /// Look up one of the built-in dictionaries by name.
    pub fn by_name(name: &str) -> Option<RenameTable> {
        ALL.iter().copied().find(|table| table.name == name)
    }
}

/// Pass-through dictionary for sources already using canonical names.
pub const IDENTITY: RenameTable = RenameTable::new("identity", &[]);

/// Foreign trade by NCM product code (`EXP_COMPLETA` / `IMP_COMPLETA`).
pub const COMEX_NCM: RenameTable = RenameTable::new(
    "comex_ncm",
    &[
        ("CO_ANO", "ano"),
        ("CO_MES", "mes"),
        ("CO_NCM", "id_ncm"),
        ("CO_UNID", "id_unidade"),
        ("CO_PAIS", "id_pais"),
        ("SG_UF_NCM", "sigla_uf_ncm"),
        ("CO_VIA", "id_via"),
        ("CO_URF", "id_urf"),
        ("QT_ESTAT", "quantidade_estatistica"),
        ("KG_LIQUIDO", "peso_liquido_kg"),
        ("VL_FOB", "valor_fob_dolar"),
        ("VL_FRETE", "valor_frete"),
        ("VL_SEGURO", "valor_seguro"),
    ],
);

/// Foreign trade by municipality (`EXP_COMPLETA_MUN` / `IMP_COMPLETA_MUN`).
pub const COMEX_MUN: RenameTable = RenameTable::new(
    "comex_mun",
    &[
        ("CO_ANO", "ano"),
        ("CO_MES", "mes"),
        ("SH4", "id_sh4"),
        ("CO_PAIS", "id_pais"),
        ("SG_UF_MUN", "sigla_uf"),
        ("CO_MUN", "id_municipio"),
        ("KG_LIQUIDO", "peso_liquido_kg"),
        ("VL_FOB", "valor_fob_dolar"),
    ],
);

const ALL: [RenameTable; 3] = [IDENTITY, COMEX_NCM, COMEX_MUN];
