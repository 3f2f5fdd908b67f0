//! End-to-end flows through the service layer on a real sled database.

use anyhow::Context;
use ewaste_ledger::{
    ActorDraft, CalendarDate, Caller, CategoryDraft, CategoryPatch, Condition, ItemDraft,
    ItemPatch, LedgerError, LedgerService, SaleStatus, SupplierDraft, TransactionDraft,
    TransactionPatch,
};
use rust_decimal_macros::dec;
use sled::open;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

struct Fixture {
    // keeps the database directory alive for the duration of the test
    _dir: TempDir,
    service: LedgerService,
    admin: Caller,
    collector: Caller,
    other_collector: Caller,
}

// Sled holds a file lock on its directory, so every test gets its own database
// under a temp dir that is removed when the fixture drops.
fn fixture(name: &str) -> anyhow::Result<Fixture> {
    let dir = tempdir()?;
    let db = open(dir.path().join(name))?;
    let db = Arc::new(db);
    db.clear()?;

    let service = LedgerService::new(db);
    let admin = service.provision_admin(ActorDraft::new("admin").set_email("admin@example.com"))?;
    let collector = service.register_actor(ActorDraft::new("collector"))?;
    let other = service.register_actor(ActorDraft::new("other"))?;

    Ok(Fixture {
        _dir: dir,
        service,
        admin: Caller::authenticated(admin.actor()),
        collector: Caller::authenticated(collector.actor()),
        other_collector: Caller::authenticated(other.actor()),
    })
}

fn today() -> CalendarDate {
    CalendarDate::today()
}

#[test]
fn collect_value_and_sell_item() -> anyhow::Result<()> {
    let f = fixture("collect_value_and_sell.db")?;

    let category = f
        .service
        .create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))
        .context("Category creation failed: ")?;

    let item = f
        .service
        .create_item(
            &f.collector,
            ItemDraft::new(category.id, dec!(4.5), Condition::Good, today()),
        )
        .context("Item creation failed: ")?;
    assert_eq!(item.estimated_value.to_string(), "22500.00");

    let sale = f.service.create_transaction(
        &f.collector,
        TransactionDraft::new(item.id, dec!(20000), "Buyer A").set_status(SaleStatus::Stocked),
    )?;
    assert_eq!(sale.status, SaleStatus::Stocked);
    assert_eq!(sale.date_sold, None);

    let sold = f.service.update_transaction(
        &f.collector,
        sale.id,
        TransactionPatch::default()
            .set_status(SaleStatus::Sold)
            .set_date_sold(today()),
    )?;
    assert_eq!(sold.status, SaleStatus::Sold);
    assert_eq!(sold.date_sold, Some(today()));

    Ok(())
}

#[test]
fn selling_requires_a_date() -> anyhow::Result<()> {
    let f = fixture("selling_requires_a_date.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("RAM", dec!(7500)))?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(1), Condition::Fair, today()),
    )?;
    let sale = f
        .service
        .create_transaction(&f.collector, TransactionDraft::new(item.id, dec!(100), "Buyer"))?;

    let err = f
        .service
        .update_transaction(&f.collector, sale.id, TransactionPatch::default().set_status(SaleStatus::Sold))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ref v) if v.field == "date_sold"));

    // nothing was written by the rejected update
    let stored = f.service.transaction(&f.collector, sale.id)?;
    assert_eq!(stored.status, SaleStatus::Stocked);

    Ok(())
}

#[test]
fn restocking_clears_date_sold() -> anyhow::Result<()> {
    let f = fixture("restocking_clears_date_sold.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("RAM", dec!(7500)))?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(1), Condition::Fair, today()),
    )?;
    let sale = f.service.create_transaction(
        &f.collector,
        TransactionDraft::new(item.id, dec!(100), "Buyer")
            .set_status(SaleStatus::Sold)
            .set_date_sold(today()),
    )?;
    assert_eq!(sale.date_sold, Some(today()));

    let restocked = f.service.update_transaction(
        &f.collector,
        sale.id,
        TransactionPatch::default().set_status(SaleStatus::Stocked),
    )?;
    assert_eq!(restocked.status, SaleStatus::Stocked);
    assert_eq!(restocked.date_sold, None);
    assert_eq!(f.service.transaction(&f.admin, sale.id)?.date_sold, None);

    Ok(())
}

#[test]
fn collectors_see_only_their_items() -> anyhow::Result<()> {
    let f = fixture("collectors_see_only_their_items.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;

    f.service.create_item(&f.admin, ItemDraft::new(category.id, dec!(5), Condition::Good, today()))?;
    let own = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(3), Condition::Fair, today()),
    )?;

    let visible = f.service.list_items(&f.collector)?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, own.id);

    assert_eq!(f.service.list_items(&f.admin)?.len(), 2);
    assert!(f.service.list_items(&Caller::Anonymous)?.is_empty());

    Ok(())
}

#[test]
fn foreign_records_look_missing() -> anyhow::Result<()> {
    let f = fixture("foreign_records_look_missing.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(2), Condition::Poor, today()),
    )?;
    let sale = f
        .service
        .create_transaction(&f.collector, TransactionDraft::new(item.id, dec!(10), "Buyer"))?;

    let intruder = &f.other_collector;
    assert!(matches!(f.service.item(intruder, item.id), Err(LedgerError::NotFound)));
    assert!(matches!(
        f.service.update_item(intruder, item.id, ItemPatch::default().set_weight(dec!(9))),
        Err(LedgerError::NotFound)
    ));
    assert!(matches!(f.service.delete_item(intruder, item.id), Err(LedgerError::NotFound)));
    assert!(matches!(f.service.estimate_item_value(intruder, item.id), Err(LedgerError::NotFound)));

    assert!(matches!(f.service.transaction(intruder, sale.id), Err(LedgerError::NotFound)));
    assert!(matches!(
        f.service.update_transaction(intruder, sale.id, TransactionPatch::default().set_buyer_name("Me")),
        Err(LedgerError::NotFound)
    ));
    assert!(f.service.list_transactions(intruder)?.is_empty());

    // cannot sell someone else's item either; same message as for a missing item
    let err = f
        .service
        .create_transaction(intruder, TransactionDraft::new(item.id, dec!(10), "Buyer"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ref v) if v.message == "Invalid item."));

    // nor move one of their own sales under it
    let own_item = f.service.create_item(
        intruder,
        ItemDraft::new(category.id, dec!(1), Condition::Good, today()),
    )?;
    let own_sale = f
        .service
        .create_transaction(intruder, TransactionDraft::new(own_item.id, dec!(5), "Buyer"))?;
    let err = f
        .service
        .update_transaction(intruder, own_sale.id, TransactionPatch::default().set_item(item.id))
        .unwrap_err();
    assert!(
        matches!(err, LedgerError::Validation(ref v) if v.field == "ewaste_item" && v.message == "Invalid item.")
    );
    assert_eq!(f.service.transaction(intruder, own_sale.id)?, own_sale);

    // and the owner's record is untouched
    assert_eq!(f.service.item(&f.collector, item.id)?.weight_kg.to_string(), "2.000");
    assert_eq!(f.service.list_transactions(&f.collector)?.len(), 1);
    assert_eq!(f.service.list_transactions(&f.admin)?.len(), 2);

    Ok(())
}

#[test]
fn item_updates_restamp_value() -> anyhow::Result<()> {
    let f = fixture("item_updates_restamp_value.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(2.5), Condition::Poor, today()),
    )?;
    assert_eq!(item.estimated_value.amount(), dec!(10000.00));

    let item = f.service.update_item(
        &f.collector,
        item.id,
        ItemPatch::default().set_condition(Condition::Fair),
    )?;
    assert_eq!(item.estimated_value.amount(), dec!(11250.00));

    // repricing the category leaves the stamped value alone
    f.service.update_category(&f.admin, category.id, CategoryPatch::default().set_base_price(dec!(6000)))?;
    let stored = f.service.item(&f.collector, item.id)?;
    assert_eq!(stored.estimated_value.amount(), dec!(11250.00));
    assert_eq!(f.service.estimate_item_value(&f.collector, item.id)?.amount(), dec!(13500.00));

    // the next valuation-relevant edit picks up the new price
    let item = f.service.update_item(
        &f.collector,
        item.id,
        ItemPatch::default().set_condition(Condition::Good),
    )?;
    assert_eq!(item.estimated_value.amount(), dec!(15000.00));

    Ok(())
}

#[test]
fn category_name_is_frozen_once_referenced() -> anyhow::Result<()> {
    let f = fixture("category_name_is_frozen_once_referenced.db")?;
    let used = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let unused = f.service.create_category(&f.admin, CategoryDraft::new("Cables", dec!(100)))?;
    f.service.create_item(&f.collector, ItemDraft::new(used.id, dec!(1), Condition::Good, today()))?;

    let err = f
        .service
        .update_category(&f.admin, used.id, CategoryPatch::default().set_name("Scrap"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ref v) if v.field == "name"));
    assert_eq!(f.service.category(&f.admin, used.id)?.name, "Circuits");
    assert!(f.service.store().category_by_name("Scrap")?.is_none());

    // price stays editable, and resubmitting the current name is not a rename
    let repriced = f.service.update_category(
        &f.admin,
        used.id,
        CategoryPatch::default().set_name("Circuits").set_base_price(dec!(6000)),
    )?;
    assert_eq!(repriced.base_price_per_kg.amount(), dec!(6000));

    let renamed = f
        .service
        .update_category(&f.admin, unused.id, CategoryPatch::default().set_name("Wiring"))?;
    assert_eq!(renamed.name, "Wiring");

    Ok(())
}

#[test]
fn oversized_valuation_is_rejected() -> anyhow::Result<()> {
    let f = fixture("oversized_valuation_is_rejected.db")?;
    let category = f
        .service
        .create_category(&f.admin, CategoryDraft::new("Bulk", dec!(99999999.99)))?;

    let err = f
        .service
        .create_item(
            &f.collector,
            ItemDraft::new(category.id, dec!(9999999.999), Condition::Good, today()),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ref v) if v.field == "estimated_value"));
    assert!(f.service.list_items(&f.admin)?.is_empty());

    Ok(())
}

#[test]
fn category_deletion_is_protected() -> anyhow::Result<()> {
    let f = fixture("category_deletion_is_protected.db")?;
    let used = f.service.create_category(&f.admin, CategoryDraft::new("Used", dec!(10)))?;
    let unused = f.service.create_category(&f.admin, CategoryDraft::new("Unused", dec!(10)))?;
    f.service.create_item(&f.collector, ItemDraft::new(used.id, dec!(1), Condition::Good, today()))?;

    let err = f.service.delete_category(&f.admin, used.id).unwrap_err();
    assert!(matches!(err, LedgerError::ReferentialIntegrity { references: 1, .. }));
    assert!(f.service.category(&f.admin, used.id).is_ok());

    f.service.delete_category(&f.admin, unused.id)?;
    assert!(matches!(f.service.category(&f.admin, unused.id), Err(LedgerError::NotFound)));

    Ok(())
}

#[test]
fn supplier_deletion_detaches_items() -> anyhow::Result<()> {
    let f = fixture("supplier_deletion_detaches_items.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let supplier = f.service.create_supplier(
        &f.admin,
        SupplierDraft::new("Local Supplier")
            .set_contact("0700-111-222")
            .set_location("Nairobi"),
    )?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(1), Condition::Good, today()).set_supplier(supplier.id),
    )?;
    let detail = f.service.item_detail(&f.collector, item.id)?;
    assert_eq!(detail.category_detail, "Circuits");
    assert_eq!(detail.supplier_detail.as_deref(), Some("Local Supplier"));

    f.service.delete_supplier(&f.admin, supplier.id)?;

    let item = f.service.item(&f.collector, item.id)?;
    assert_eq!(item.supplier, None);

    Ok(())
}

#[test]
fn deleting_item_removes_its_transactions() -> anyhow::Result<()> {
    let f = fixture("deleting_item_removes_transactions.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(1), Condition::Good, today()),
    )?;
    let sale = f
        .service
        .create_transaction(&f.collector, TransactionDraft::new(item.id, dec!(10), "Buyer"))?;

    f.service.delete_item(&f.collector, item.id)?;

    assert!(matches!(f.service.transaction(&f.admin, sale.id), Err(LedgerError::NotFound)));
    assert!(f.service.list_transactions(&f.admin)?.is_empty());

    // the category is free again
    f.service.delete_category(&f.admin, category.id)?;

    Ok(())
}

#[test]
fn deleting_collector_keeps_their_items() -> anyhow::Result<()> {
    let f = fixture("deleting_collector_keeps_items.db")?;
    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let item = f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(1), Condition::Good, today()),
    )?;
    let collector_id = f.collector.actor().map(|a| a.id).context("collector has an id")?;

    f.service.delete_actor(&f.admin, collector_id)?;

    let orphan = f.service.item(&f.admin, item.id)?;
    assert_eq!(orphan.collector, None);
    assert!(f.service.list_items(&f.collector)?.is_empty());

    Ok(())
}

#[test]
fn privileged_operations_are_gated() -> anyhow::Result<()> {
    let f = fixture("privileged_operations_are_gated.db")?;

    assert!(matches!(
        f.service.create_category(&f.collector, CategoryDraft::new("Boards", dec!(6000))),
        Err(LedgerError::Forbidden)
    ));
    assert!(matches!(
        f.service.create_supplier(&f.collector, SupplierDraft::new("Depot")),
        Err(LedgerError::Forbidden)
    ));
    assert!(matches!(
        f.service.create_category(&Caller::Anonymous, CategoryDraft::new("Boards", dec!(6000))),
        Err(LedgerError::Unauthenticated)
    ));

    let category = f.service.create_category(&f.admin, CategoryDraft::new("Boards", dec!(6000)))?;
    assert_eq!(f.service.list_categories(&f.collector)?.len(), 1);
    assert!(f.service.list_categories(&Caller::Anonymous)?.is_empty());

    assert!(matches!(
        f.service.create_item(
            &Caller::Anonymous,
            ItemDraft::new(category.id, dec!(1), Condition::Good, today())
        ),
        Err(LedgerError::Unauthenticated)
    ));

    let reports = f.service.reports();
    assert!(matches!(reports.monthly(&f.collector), Err(LedgerError::Forbidden)));
    assert!(matches!(reports.daily(&Caller::Anonymous, today()), Err(LedgerError::Unauthenticated)));
    assert!(matches!(reports.supplier_ranking(&f.collector), Err(LedgerError::Forbidden)));

    Ok(())
}

#[test]
fn reports_cover_every_collector() -> anyhow::Result<()> {
    let f = fixture("reports_cover_every_collector.db")?;
    let reports = f.service.reports();

    // nothing recorded yet
    let empty = reports.daily(&f.admin, today())?;
    assert_eq!(empty.items_collected, 0);
    assert_eq!(empty.total_estimated_value, dec!(0));
    assert!(reports.monthly(&f.admin)?.is_empty());

    let category = f.service.create_category(&f.admin, CategoryDraft::new("Circuits", dec!(5000)))?;
    let supplier = f.service.create_supplier(&f.admin, SupplierDraft::new("Supplier One"))?;
    let idle = f.service.create_supplier(&f.admin, SupplierDraft::new("Supplier Two"))?;
    f.service.create_item(
        &f.collector,
        ItemDraft::new(category.id, dec!(5), Condition::Good, today()).set_supplier(supplier.id),
    )?;
    f.service.create_item(
        &f.other_collector,
        ItemDraft::new(category.id, dec!(1), Condition::Poor, today()),
    )?;

    let daily = reports.daily(&f.admin, today())?;
    assert_eq!(daily.items_collected, 2);
    assert_eq!(daily.total_weight_kg, dec!(6));
    assert_eq!(daily.total_estimated_value, dec!(29000));

    let monthly = reports.monthly(&f.admin)?;
    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly[0].month, today().month_key());

    let ranking = reports.supplier_ranking(&f.admin)?;
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].supplier_id, supplier.id);
    assert_eq!(ranking[0].total_estimated_value, dec!(25000));
    assert_eq!(ranking[1].supplier_id, idle.id);
    assert_eq!(ranking[1].item_count, 0);

    Ok(())
}

#[test]
fn seeding_is_idempotent() -> anyhow::Result<()> {
    let f = fixture("seeding_is_idempotent.db")?;
    let seeds = ewaste_ledger::Config::default().seed_categories;

    let first = f.service.seed_categories(&f.admin, &seeds)?;
    assert_eq!(first.created.len(), 3);
    assert!(first.existing.is_empty());

    let second = f.service.seed_categories(&f.admin, &seeds)?;
    assert!(second.created.is_empty());
    assert_eq!(second.existing.len(), 3);

    let names: Vec<_> = f
        .service
        .list_categories(&f.collector)?
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Motherboards", "Phone Boards", "RAM"]);

    Ok(())
}

#[test]
fn duplicate_usernames_are_rejected() -> anyhow::Result<()> {
    let f = fixture("duplicate_usernames_are_rejected.db")?;
    let err = f.service.register_actor(ActorDraft::new("collector")).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ref v) if v.field == "username"));
    Ok(())
}
