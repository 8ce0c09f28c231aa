pub mod ad_server;
