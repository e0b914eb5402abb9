//! Built-in demonstration schema.
//!
//! A small city/country database that uses every kind of migration: plain
//! commands, a transaction function, a database function and a replay.

use waymark_core::{Action, Schema, Value};

/// Build the demonstration schema.
pub fn world_schema() -> Schema {
    let mut schema = Schema::new();

    schema
        .define(1)
        .up(r#"
            create table city (
                id integer not null,
                name text not null,
                countrycode character(3) not null,
                district text not null,
                population integer not null
            );
        "#)
        .down("drop table city;");

    schema
        .define(2)
        .up(r#"
            create table country (
                code character(3) not null,
                name text not null,
                continent text not null,
                region text not null,
                population integer not null,
                localname text not null
            );
        "#)
        .down("drop table country;");

    schema
        .define(3)
        .up(r#"
            drop view if exists city_country;

            create view city_country as
                select city.id, city.name, country.name as country_name
                from city
                inner join country on city.countrycode = country.code;
        "#)
        .down("drop view city_country;");

    schema
        .define(4)
        .up_action(Action::tx_fn(|tx| {
            tx.execute(
                "insert into city(id, name, countrycode, district, population) values(?, ?, ?, ?, ?)",
                &[
                    Value::from(1),
                    Value::from("Kabul"),
                    Value::from("AFG"),
                    Value::from("Kabol"),
                    Value::from(1_780_000),
                ],
            )?;
            Ok(())
        }))
        .down_action(Action::tx_fn(|tx| {
            tx.execute("delete from city where id = ?", &[Value::from(1)])?;
            Ok(())
        }));

    schema
        .define(5)
        .up_action(Action::db_fn(|db| {
            db.execute(
                "insert into country(code, name, continent, region, population, localname) values(?, ?, ?, ?, ?, ?)",
                &[
                    Value::from("AFG"),
                    Value::from("Afghanistan"),
                    Value::from("Asia"),
                    Value::from("Southern and Central Asia"),
                    Value::from(22_720_000),
                    Value::from("Afganistan/Afqanestan"),
                ],
            )?;
            Ok(())
        }))
        .down_action(Action::db_fn(|db| {
            db.execute("delete from country where code = ?", &[Value::from("AFG")])?;
            Ok(())
        }));

    schema
        .define(6)
        .up(r#"
            drop view if exists city_country;

            create view city_country as
                select city.id, city.name, country.name as country_name, district
                from city
                inner join country on city.countrycode = country.code;
        "#)
        .down_action(Action::replay(3));

    schema
}
