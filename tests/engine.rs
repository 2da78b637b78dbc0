use dexcel::column::MERGE_KEY_COLS;
use dexcel::template::Templates;
use dexcel::{DbError, RowStatus, Table};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn leads() -> Table {
    Table::new(
        strings(&["NOME", "COGNOME", "ZONA", "TELEFONO", "MQ", "INDIRIZZO", "CONVERTITA", "PASSATA NON CONVERTITA"]),
        vec![
            strings(&["Mario", "Rossi", "Nord", "111", "80", "Via Roma 1"]),
            strings(&["Anna", "Bianchi", "Sud", "222", "120", "Via Po 2"]),
            strings(&["Luca", "Neri", "Centro", "333", "95", "Corso Italia 3"]),
        ],
    )
}

#[test]
fn string_tables_survive_encode_then_decode() {
    let table = leads();
    let grid = dexcel::encode(&table)
        .into_iter()
        .map(|row| row.into_iter().map(Some).collect::<Vec<_>>());
    assert_eq!(dexcel::decode(grid).unwrap(), table);

    let json = dexcel::table::to_json(&table, "Leads").unwrap();
    assert_eq!(dexcel::table::from_json(&json).unwrap(), table);
}

#[test]
fn every_status_update_leaves_at_most_one_marker() {
    let mut table = leads();
    let updates = [
        (2, RowStatus::Converted),
        (3, RowStatus::NotConverted),
        (2, RowStatus::NotConverted),
        (4, RowStatus::Converted),
        (4, RowStatus::Cleared),
        (4, RowStatus::Cleared),
    ];
    for (row, status) in updates {
        dexcel::set_status(&mut table, row, status).unwrap();
        for data in table.rows() {
            let marked = data[6..].iter().filter(|cell| *cell == "X").count();
            assert!(marked <= 1, "row {:?} has both markers", data);
        }
    }
    assert_eq!(table.rows()[0][6..], ["", "X"]);
    assert_eq!(table.rows()[2][6..], ["", ""]);
}

#[test]
fn merge_imports_first_new_key_only() {
    let mut master = leads();
    let source = Table::new(
        strings(&["NOME", "COGNOME", "ZONA"]),
        vec![
            strings(&["Sara", "Verdi", "Est"]),       // new
            strings(&["mario ", "ROSSI", "nord"]),    // already in master
            strings(&["SARA", "verdi", " est "]),     // duplicate within source
        ],
    );
    let imported = dexcel::merge(&mut master, &[source], &MERGE_KEY_COLS).unwrap();
    assert_eq!(imported, 1);
    assert_eq!(master.row_count(), 4);
    assert_eq!(master.rows()[3][..3], ["Sara", "Verdi", "Est"]);
}

#[test]
fn rows_with_blank_keys_are_never_imported() {
    let mut master = Table::new(strings(&["NOME", "COGNOME", "ZONA", "NOTE"]), vec![]);
    let source = Table::new(
        strings(&["NOME", "COGNOME", "ZONA", "NOTE"]),
        vec![
            strings(&["", " ", "", "only a note"]),
            strings(&["", "", "", ""]),
            strings(&["", "", "", "another note"]),
        ],
    );
    let imported = dexcel::merge(&mut master, &[source], &MERGE_KEY_COLS).unwrap();
    assert_eq!(imported, 0);
    assert!(master.is_empty());
}

#[test]
fn appended_rows_are_padded_to_header_width() {
    let mut table = Table::new(strings(&["A", "B", "C", "D", "E"]), vec![]);
    dexcel::append_row(&mut table, ["Mario", "Rossi"]);
    assert_eq!(table.rows()[0], strings(&["Mario", "Rossi", "", "", ""]));
}

#[test]
fn client_row_indices_map_past_the_header() {
    let mut table = leads();
    let removed = dexcel::delete_row(&mut table, dexcel::sheet_row(0)).unwrap();
    assert_eq!(removed[0], "Mario");
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.rows()[0][0], "Anna");

    let mut table = leads();
    let err = dexcel::delete_row(&mut table, dexcel::sheet_row(3)).unwrap_err();
    assert!(matches!(err, DbError::RowOutOfRange { row: 5, last: 4 }));
    assert_eq!(table, leads());
}

#[test]
fn template_follows_the_converted_column() {
    let mut table = leads();
    dexcel::set_status(&mut table, 2, RowStatus::Converted).unwrap();
    let templates = Templates::default();

    let converted = dexcel::render(&table, 2, &templates).unwrap();
    assert_eq!(
        converted,
        "-Mario Rossi;\n-111;\n-80;\n-Via Roma 1;\n(Già chiamato, si aspetta una chiamata in giornata)"
    );

    let neutral = dexcel::render(&table, 3, &templates).unwrap();
    assert!(neutral.ends_with("Passata non convertita, continuiamo a provare a contattarla."));
}

#[test]
fn csv_upload_merges_into_master() {
    let mut master = leads();
    let source = dexcel::loader::load_table(
        "extra.csv",
        b"ZONA,NOME,COGNOME\nSud,Anna,Bianchi\nOvest,Paolo,Gialli\n",
    )
    .unwrap();
    let imported = dexcel::merge(&mut master, &[source], &MERGE_KEY_COLS).unwrap();
    assert_eq!(imported, 1);
    assert_eq!(dexcel::downloader::to_csv(&master).lines().count(), 5);
}
